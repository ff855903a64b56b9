//! Deterministic resupply rules.
//!
//! The rule engine is a pure function of a site's demand, inventory and expiry
//! horizon. It has no failure modes and is the fallback for every reasoning
//! failure, so its reason text always embeds the literal numbers it used.

use crate::config::RulesConfig;
use crate::site::{Action, Decision, DecisionSource, Site};

/// Confidence attached to rule-lane decisions.
pub const RULE_CONFIDENCE: f64 = 0.5;

/// Result of evaluating the rules for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub action: Action,
    pub quantity: u32,
    pub safety_stock: i64,
    pub reason: String,
}

/// Applies [`RulesConfig`] thresholds to site features.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RulesConfig,
}

impl RuleEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn min_order_quantity(&self) -> u32 {
        self.config.min_order_quantity
    }

    /// Evaluate the rules on raw features.
    ///
    /// Expiring stock always triggers a resupply; otherwise a resupply is
    /// recommended only when demand exceeds inventory plus safety stock.
    pub fn evaluate(&self, demand: u32, inventory: u32, days_to_expiry: i32) -> RuleOutcome {
        let demand_i = i64::from(demand);
        let inventory_i = i64::from(inventory);
        // Epsilon absorbs representation error: 1.2 - 1.0 is 0.19999999999999996.
        let safety_stock =
            (f64::from(demand) * (self.config.safety_stock_multiplier - 1.0) + 1e-9).floor() as i64;
        let order_quantity = || {
            let shortfall = demand_i
                .saturating_add(safety_stock)
                .saturating_sub(inventory_i);
            let quantity = shortfall.max(i64::from(self.config.min_order_quantity));
            u32::try_from(quantity).unwrap_or(u32::MAX)
        };

        if days_to_expiry < self.config.expiry_threshold_days {
            let quantity = order_quantity();
            return RuleOutcome {
                action: Action::Resupply,
                quantity,
                safety_stock,
                reason: format!(
                    "Inventory expiring in {} days (threshold {}). Projected demand: {}, \
                     current inventory: {}, safety stock: {}. Resupply {} kits to maintain stock levels.",
                    days_to_expiry,
                    self.config.expiry_threshold_days,
                    demand,
                    inventory,
                    safety_stock,
                    quantity
                ),
            };
        }

        if demand_i > inventory_i.saturating_add(safety_stock) {
            let quantity = order_quantity();
            RuleOutcome {
                action: Action::Resupply,
                quantity,
                safety_stock,
                reason: format!(
                    "Projected 30-day demand ({}) exceeds current inventory ({}) plus safety stock ({}). \
                     Resupply {} kits recommended.",
                    demand, inventory, safety_stock, quantity
                ),
            }
        } else {
            RuleOutcome {
                action: Action::NoResupply,
                quantity: 0,
                safety_stock,
                reason: format!(
                    "Current inventory ({}) covers projected 30-day demand ({}) plus safety stock ({}). \
                     No resupply needed at this time.",
                    inventory, demand, safety_stock
                ),
            }
        }
    }

    /// Produce the rule-lane decision for a site.
    pub fn decide(&self, site: &Site) -> Decision {
        let outcome = self.evaluate(site.demand, site.inventory, site.days_to_expiry);
        Decision {
            site_id: site.id.clone(),
            action: outcome.action,
            quantity: outcome.quantity,
            confidence: RULE_CONFIDENCE,
            reason: format!("{} (Rules engine)", outcome.reason),
            reasons: vec!["Using rules engine".to_string()],
            source: DecisionSource::Rule,
            degraded: false,
            latency_ms: 0.0,
        }
    }

    /// Rule-lane decision for a site that was meant for the reasoning lane.
    pub fn degrade(&self, site: &Site, cause: &str) -> Decision {
        let mut decision = self.decide(site);
        decision.degraded = true;
        decision.reasons.push(format!("Reasoning unavailable: {}", cause));
        decision
    }
}
