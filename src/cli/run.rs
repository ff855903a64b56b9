//! Run command implementation

use crate::cli::{output, RunArgs};
use crate::config::{LogFormat, SupplyConfig};
use crate::orchestrator::{Orchestrator, RunInput};
use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(args: &RunArgs) -> anyhow::Result<SupplyConfig> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        SupplyConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        SupplyConfig::default()
    };

    config = config.with_env_overrides();

    if let Some(size) = args.batch_size {
        config.dispatch.batch_size = size;
    }
    if let Some(limit) = args.max_concurrent {
        config.dispatch.max_concurrent = limit;
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Initialize tracing based on configuration
///
/// Events go to stderr so `--json` output on stdout stays parseable.
pub fn init_tracing(config: &crate::config::LoggingConfig) -> anyhow::Result<()> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if config.log_prompts {
        eprintln!("WARNING: Prompt logging is enabled. Prompts carry site supply data.");
    }

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Read and parse a run input document.
pub fn read_input(path: &std::path::Path) -> anyhow::Result<RunInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading run input {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing run input {}", path.display()))
}

/// Main run command handler
pub async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    init_tracing(&config.logging)?;

    let metrics = if args.metrics {
        Some(crate::metrics::setup_metrics()?)
    } else {
        None
    };

    let input = read_input(&args.input)?;
    tracing::debug!(?config, "Loaded configuration");

    let orchestrator = if args.rules_only {
        Orchestrator::rules_only(config)?
    } else {
        Orchestrator::new(config)?
    };
    let run = orchestrator.run(input).await?;

    if args.json {
        println!("{}", output::format_run_json(&run)?);
    } else {
        println!("{}", output::format_decisions_table(&run.sites));
        println!("{}", output::format_summary(&run.summary));
    }

    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }

    Ok(())
}
