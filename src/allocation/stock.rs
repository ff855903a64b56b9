//! Safety stock and depot inventory targets.

use super::{AllocationOptimizer, Depot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of total demand a depot should hold.
const DEPOT_DEMAND_SHARE: f64 = 0.3;
/// Default reorder point as a share of the recommended level.
const REORDER_SHARE: f64 = 0.5;

/// Z value for a service level. Unknown levels use the 95% value.
pub fn z_score(service_level: f64) -> f64 {
    const TABLE: [(f64, f64); 3] = [(0.90, 1.28), (0.95, 1.645), (0.99, 2.33)];
    TABLE
        .iter()
        .find(|(level, _)| (level - service_level).abs() < 1e-9)
        .map(|&(_, z)| z)
        .unwrap_or(1.645)
}

/// Per-site inputs for the safety stock calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyStockInput {
    pub site_id: String,
    /// Average weekly demand.
    pub weekly_demand: f64,
    #[serde(default)]
    pub lead_time_days: Option<u32>,
    /// Coefficient of variation of demand.
    #[serde(default)]
    pub variability: Option<f64>,
}

/// Recommended stock levels for one depot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepotTarget {
    pub depot_id: String,
    pub recommended_inventory: u32,
    pub capacity: u32,
    pub utilization_percent: f64,
    pub reorder_point: f64,
    pub reorder_quantity: f64,
}

impl AllocationOptimizer {
    /// Safety stock per site:
    /// `z * demand_during_lead_time * cv * sqrt(lead_time / 7)`, truncated.
    pub fn safety_stock(&self, sites: &[SafetyStockInput]) -> BTreeMap<String, u32> {
        let z = z_score(self.config.service_level);
        sites
            .iter()
            .map(|site| {
                let lead_time = f64::from(
                    site.lead_time_days
                        .unwrap_or(self.config.default_lead_time_days),
                );
                let cv = site.variability.unwrap_or(self.config.default_variability);
                let weeks = lead_time / 7.0;
                let std_demand = site.weekly_demand * weeks * cv;
                let stock = (z * std_demand * weeks.sqrt()).max(0.0);
                (site.site_id.clone(), stock as u32)
            })
            .collect()
    }

    /// Target inventory per depot that declares a capacity.
    pub fn depot_targets(&self, depots: &[Depot], total_demand: u64) -> Vec<DepotTarget> {
        let share = (total_demand as f64 * DEPOT_DEMAND_SHARE) as u64;
        depots
            .iter()
            .filter_map(|depot| {
                let capacity = depot.capacity?;
                let recommended = u64::from(capacity).min(share) as u32;
                let reorder_point = depot
                    .reorder_point
                    .map(f64::from)
                    .unwrap_or(f64::from(recommended) * REORDER_SHARE);
                let utilization_percent = if capacity > 0 {
                    f64::from(recommended) * 100.0 / f64::from(capacity)
                } else {
                    0.0
                };
                Some(DepotTarget {
                    depot_id: depot.depot_id.clone(),
                    recommended_inventory: recommended,
                    capacity,
                    utilization_percent,
                    reorder_point,
                    reorder_quantity: f64::from(recommended) - reorder_point,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocationConfig;
    use std::collections::HashMap;

    fn input(id: &str, weekly: f64, lead: Option<u32>, cv: Option<f64>) -> SafetyStockInput {
        SafetyStockInput {
            site_id: id.to_string(),
            weekly_demand: weekly,
            lead_time_days: lead,
            variability: cv,
        }
    }

    #[test]
    fn test_z_table() {
        assert_eq!(z_score(0.90), 1.28);
        assert_eq!(z_score(0.95), 1.645);
        assert_eq!(z_score(0.99), 2.33);
        assert_eq!(z_score(0.97), 1.645);
    }

    #[test]
    fn test_one_week_lead_time() {
        // 1.645 * 100 * 1 * 0.2 * 1 = 32.9
        let stock = AllocationOptimizer::default().safety_stock(&[input("A", 100.0, None, None)]);
        assert_eq!(stock["A"], 32);
    }

    #[test]
    fn test_longer_lead_time_and_variability() {
        let optimizer = AllocationOptimizer::new(AllocationConfig {
            service_level: 0.99,
            ..Default::default()
        });
        // 2.33 * (70 * 2) * 0.5 * sqrt(2) = 230.66...
        let stock = optimizer.safety_stock(&[input("A", 70.0, Some(14), Some(0.5))]);
        assert_eq!(stock["A"], 230);
    }

    #[test]
    fn test_zero_demand_zero_stock() {
        let stock = AllocationOptimizer::default().safety_stock(&[input("A", 0.0, Some(3), None)]);
        assert_eq!(stock["A"], 0);
    }

    #[test]
    fn test_depot_targets() {
        let depots = vec![
            Depot {
                depot_id: "big".into(),
                inventory: 0,
                capacity: Some(1000),
                holding_cost: None,
                reorder_point: None,
                lead_times: HashMap::new(),
                shipping_costs: HashMap::new(),
            },
            Depot {
                depot_id: "small".into(),
                inventory: 0,
                capacity: Some(50),
                holding_cost: None,
                reorder_point: Some(20),
                lead_times: HashMap::new(),
                shipping_costs: HashMap::new(),
            },
            Depot {
                depot_id: "unknown".into(),
                inventory: 0,
                capacity: None,
                holding_cost: None,
                reorder_point: None,
                lead_times: HashMap::new(),
                shipping_costs: HashMap::new(),
            },
        ];

        let targets = AllocationOptimizer::default().depot_targets(&depots, 500);

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].recommended_inventory, 150);
        assert_eq!(targets[0].reorder_point, 75.0);
        assert_eq!(targets[0].reorder_quantity, 75.0);
        assert_eq!(targets[0].utilization_percent, 15.0);
        assert_eq!(targets[1].recommended_inventory, 50);
        assert_eq!(targets[1].reorder_point, 20.0);
        assert_eq!(targets[1].utilization_percent, 100.0);
    }
}
