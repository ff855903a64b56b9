//! Allocation and safety-stock configuration

use serde::{Deserialize, Serialize};

/// Settings for the depot allocation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Target service level for safety stock (0.90, 0.95 or 0.99 map to table Z values).
    pub service_level: f64,
    /// Lead time assumed when none is known for a site.
    pub default_lead_time_days: u32,
    /// Coefficient of variation assumed when a site supplies none.
    pub default_variability: f64,
    /// Depot synthesised when the run input carries no depot data.
    pub default_depot_id: String,
    /// Stock of the synthesised depot, as a multiple of total resupply demand.
    pub default_depot_multiplier: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            service_level: 0.95,
            default_lead_time_days: 7,
            default_variability: 0.2,
            default_depot_id: "DEPOT_001".to_string(),
            default_depot_multiplier: 2,
        }
    }
}
