//! Lane routing configuration

use serde::{Deserialize, Serialize};

/// Controls which sites are sent to the reasoning lane.
///
/// With `selective = false` every site goes to the reasoning lane (while the
/// failure budget holds). With `selective = true` only sites matching at least
/// one priority criterion do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Route only priority sites to the reasoning lane.
    pub selective: bool,
    /// Urgency score at or above which a site is a priority site.
    pub urgency_priority: f64,
    /// Days to expiry at or below which a site is a priority site.
    pub expiry_days: i32,
    /// Consecutive reasoning failures after which the lane is closed for the run.
    pub failure_budget: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            selective: true,
            urgency_priority: 1.5,
            expiry_days: 60,
            failure_budget: 3,
        }
    }
}
