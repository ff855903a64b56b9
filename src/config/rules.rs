//! Rule engine thresholds

use serde::{Deserialize, Serialize};

/// Thresholds for the deterministic resupply rules.
///
/// # Example
///
/// ```toml
/// [rules]
/// safety_stock_multiplier = 1.2
/// expiry_threshold_days = 30
/// min_order_quantity = 10
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Target stock as a multiple of projected demand. Must be >= 1.0.
    pub safety_stock_multiplier: f64,
    /// Stock expiring in fewer days than this is always replaced.
    pub expiry_threshold_days: i32,
    /// Smallest quantity a resupply may order.
    pub min_order_quantity: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            safety_stock_multiplier: 1.2,
            expiry_threshold_days: 30,
            min_order_quantity: 10,
        }
    }
}
