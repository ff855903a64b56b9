//! Tracing filter construction.
//!
//! The subscriber itself is installed by the binary; this module only turns
//! a [`LoggingConfig`](crate::config::LoggingConfig) into an `EnvFilter`
//! directive string.

/// Build filter directives string from LoggingConfig
///
/// The base level comes first, followed by one `clinsupply::<component>=<level>`
/// directive per configured component, in component name order.
///
/// # Examples
///
/// ```
/// use clinsupply::config::{LogFormat, LoggingConfig};
/// use clinsupply::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("reasoning".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
///     log_prompts: false,
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,clinsupply::reasoning=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",clinsupply::{}={}", component, level));
        }
    }

    filter_str
}
