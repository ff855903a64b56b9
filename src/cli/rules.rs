//! Rules command handler

use crate::cli::{output, RulesArgs};
use crate::config::SupplyConfig;
use crate::rules::RuleEngine;

/// Handle `clinsupply rules` command
pub fn handle_rules(args: &RulesArgs) -> anyhow::Result<String> {
    let config = if args.config.exists() {
        SupplyConfig::load(Some(&args.config))?
    } else {
        SupplyConfig::default()
    }
    .with_env_overrides();
    config.validate()?;

    let engine = RuleEngine::new(config.rules);
    let outcome = engine.evaluate(args.demand, args.inventory, args.days_to_expiry);
    Ok(output::format_rule_outcome(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_rules_with_defaults() {
        let args = RulesArgs {
            demand: 100,
            inventory: 50,
            days_to_expiry: 60,
            config: PathBuf::from("nonexistent.toml"),
        };
        let output = handle_rules(&args).unwrap();
        assert!(output.contains("70"));
        assert!(output.contains("safety stock 20"));
    }

    #[test]
    fn test_rules_reads_thresholds_from_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[rules]\nmin_order_quantity = 25").unwrap();

        let args = RulesArgs {
            demand: 50,
            inventory: 60,
            days_to_expiry: 5,
            config: temp.path().to_path_buf(),
        };
        let output = handle_rules(&args).unwrap();
        assert!(output.contains("Resupply 25 kits"));
    }

    #[test]
    fn test_rules_rejects_invalid_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[rules]\nsafety_stock_multiplier = 0.5").unwrap();

        let args = RulesArgs {
            demand: 1,
            inventory: 1,
            days_to_expiry: 60,
            config: temp.path().to_path_buf(),
        };
        assert!(handle_rules(&args).is_err());
    }
}
