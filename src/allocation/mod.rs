//! Depot to site allocation.
//!
//! A single greedy pass: sites in descending net demand, each served by the
//! depot with the lowest `lead_time + 0.1 * shipping_cost` that still holds
//! stock. There is no backtracking, so the plan is not globally optimal.
//! Infeasibility is data, not an error: whatever cannot be served is reported
//! as unmet demand.

pub mod stock;

pub use stock::{z_score, DepotTarget, SafetyStockInput};

use crate::config::AllocationConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Weight of shipping cost relative to lead time when scoring depots.
pub const COST_WEIGHT: f64 = 0.1;

/// A depot as supplied with the run input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    #[serde(alias = "id")]
    pub depot_id: String,
    pub inventory: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    /// Cost per unit of stock left at the depot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_point: Option<u32>,
    /// Lead time in days to each site. Sites not listed cannot be served.
    #[serde(default)]
    pub lead_times: HashMap<String, u32>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub shipping_costs: HashMap<String, f64>,
}

impl Depot {
    /// `(score, lead_time)` for serving `site_id`, if there is a route.
    /// A NaN shipping cost scores as infinitely expensive.
    fn score(&self, site_id: &str) -> Option<(f64, u32)> {
        let lead_time = *self.lead_times.get(site_id)?;
        let cost = match self.shipping_costs.get(site_id).copied() {
            Some(cost) if cost.is_nan() => f64::INFINITY,
            Some(cost) => cost,
            None => 0.0,
        };
        Some((f64::from(lead_time) + COST_WEIGHT * cost, lead_time))
    }
}

/// Demand at one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDemand {
    pub site_id: String,
    pub demand: u32,
    #[serde(default)]
    pub inventory: u32,
}

impl SiteDemand {
    pub fn new(site_id: impl Into<String>, demand: u32, inventory: u32) -> Self {
        Self {
            site_id: site_id.into(),
            demand,
            inventory,
        }
    }

    pub fn net_demand(&self) -> u32 {
        self.demand.saturating_sub(self.inventory)
    }
}

/// One shipment in the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEdge {
    pub depot_id: String,
    pub site_id: String,
    pub quantity: u32,
    pub lead_time_days: u32,
}

/// Output of [`AllocationOptimizer::allocate`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<AllocationEdge>,
    pub total_allocated: u64,
    /// Shortfall per site; sites fully served are absent.
    pub unmet_demand: BTreeMap<String, u32>,
    /// Stock left at each depot after the pass.
    pub excess_inventory: BTreeMap<String, u32>,
    /// Percentage of net demand served, 0 when there was none.
    pub optimization_score: f64,
}

impl AllocationPlan {
    pub fn total_unmet(&self) -> u64 {
        self.unmet_demand.values().map(|&q| u64::from(q)).sum()
    }

    pub fn allocated_to(&self, site_id: &str) -> u64 {
        self.allocations
            .iter()
            .filter(|e| e.site_id == site_id)
            .map(|e| u64::from(e.quantity))
            .sum()
    }
}

/// Shipping and holding cost of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LogisticsCost {
    pub shipping: f64,
    pub holding: f64,
    pub total: f64,
}

/// Greedy allocator plus stock-level calculators.
#[derive(Debug, Clone, Default)]
pub struct AllocationOptimizer {
    config: AllocationConfig,
}

impl AllocationOptimizer {
    pub fn new(config: AllocationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// Build the allocation plan.
    ///
    /// Sites are ordered by net demand, largest first; equal net demand keeps
    /// input order. Equal depot scores go to the depot listed first.
    pub fn allocate(&self, sites: &[SiteDemand], depots: &[Depot]) -> AllocationPlan {
        let mut remaining: Vec<u32> = depots.iter().map(|d| d.inventory).collect();

        let mut order: Vec<(usize, u32)> = sites
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.net_demand()))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1));

        let mut plan = AllocationPlan::default();
        let mut total_net: u64 = 0;

        for (i, net) in order {
            if net == 0 {
                continue;
            }
            total_net += u64::from(net);
            let site = &sites[i];

            let mut best: Option<(usize, f64, u32)> = None;
            for (d, depot) in depots.iter().enumerate() {
                if remaining[d] == 0 {
                    continue;
                }
                if let Some((score, lead_time)) = depot.score(&site.site_id) {
                    if best.map_or(true, |(_, s, _)| score.total_cmp(&s).is_lt()) {
                        best = Some((d, score, lead_time));
                    }
                }
            }

            let Some((d, _, lead_time_days)) = best else {
                tracing::debug!(site_id = %site.site_id, net, "no depot can serve site");
                plan.unmet_demand.insert(site.site_id.clone(), net);
                continue;
            };

            let quantity = remaining[d].min(net);
            remaining[d] -= quantity;
            plan.total_allocated += u64::from(quantity);
            plan.allocations.push(AllocationEdge {
                depot_id: depots[d].depot_id.clone(),
                site_id: site.site_id.clone(),
                quantity,
                lead_time_days,
            });
            if quantity < net {
                plan.unmet_demand.insert(site.site_id.clone(), net - quantity);
            }
        }

        for (depot, left) in depots.iter().zip(&remaining) {
            if *left > 0 {
                plan.excess_inventory.insert(depot.depot_id.clone(), *left);
            }
        }

        plan.optimization_score = if total_net == 0 {
            0.0
        } else {
            plan.total_allocated as f64 * 100.0 / total_net as f64
        };

        tracing::debug!(
            edges = plan.allocations.len(),
            total_allocated = plan.total_allocated,
            unmet_sites = plan.unmet_demand.len(),
            score = plan.optimization_score,
            "allocation plan built"
        );
        plan
    }

    /// Shipping cost of every edge plus holding cost of each depot's excess.
    pub fn logistics_cost(&self, plan: &AllocationPlan, depots: &[Depot]) -> LogisticsCost {
        let by_id: HashMap<&str, &Depot> =
            depots.iter().map(|d| (d.depot_id.as_str(), d)).collect();

        let shipping: f64 = plan
            .allocations
            .iter()
            .filter_map(|edge| {
                let cost = by_id.get(edge.depot_id.as_str())?.shipping_costs.get(&edge.site_id)?;
                Some(cost * f64::from(edge.quantity))
            })
            .sum();

        let holding: f64 = plan
            .excess_inventory
            .iter()
            .filter_map(|(depot_id, &left)| {
                let cost = by_id.get(depot_id.as_str())?.holding_cost?;
                Some(cost * f64::from(left))
            })
            .sum();

        LogisticsCost {
            shipping,
            holding,
            total: shipping + holding,
        }
    }
}
