//! Site and decision data model.
//!
//! A [`SiteRecord`] is what the feature provider hands us: loosely typed, with
//! optional fields. Run preparation turns it into an immutable [`Site`] that every
//! downstream component reads. Every site produces exactly one [`Decision`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Days-to-expiry used when the feature provider has no expiry information.
pub const UNKNOWN_EXPIRY_DAYS: i32 = 999;

/// Per-site record as delivered by the feature provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(alias = "demand")]
    pub projected_30d_demand: u32,
    #[serde(alias = "inventory")]
    pub current_inventory: u32,
    #[serde(default)]
    pub days_to_expiry: Option<i32>,
    #[serde(default)]
    pub urgency_score: Option<f64>,
    #[serde(default)]
    pub weekly_dispense_kits: f64,
    /// Weekly enrollment counts, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weekly_enrollment: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_fail_rate: Option<f64>,
    /// Coefficient of variation of demand, used for safety stock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_variability: Option<f64>,
}

/// Immutable per-run view of a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub name: String,
    pub region: String,
    pub demand: u32,
    pub inventory: u32,
    pub days_to_expiry: i32,
    pub urgency_score: f64,
    pub weekly_dispense_kits: f64,
    pub demand_variability: Option<f64>,
}

impl Site {
    /// Urgency as computed by the feature provider when it does not supply one.
    pub fn default_urgency(demand: u32, inventory: u32) -> f64 {
        f64::from(demand) / (f64::from(inventory) + 1.0)
    }

    /// Build a site from a record, filling defaults for missing features.
    ///
    /// `demand` overrides the record's projected demand (used after enrollment
    /// adjustment).
    pub fn from_record(record: &SiteRecord, demand: u32) -> Self {
        Self {
            id: record.site_id.clone(),
            name: record
                .site_name
                .clone()
                .unwrap_or_else(|| record.site_id.clone()),
            region: record
                .region
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            demand,
            inventory: record.current_inventory,
            days_to_expiry: record.days_to_expiry.unwrap_or(UNKNOWN_EXPIRY_DAYS),
            urgency_score: record
                .urgency_score
                .unwrap_or_else(|| Self::default_urgency(demand, record.current_inventory)),
            weekly_dispense_kits: record.weekly_dispense_kits,
            demand_variability: record.demand_variability,
        }
    }

    /// Demand not already covered by on-hand inventory.
    pub fn net_demand(&self) -> u32 {
        self.demand.saturating_sub(self.inventory)
    }

    /// Human label for the expiry horizon, as shown in prompts.
    pub fn expiry_status(&self) -> &'static str {
        if self.days_to_expiry < 0 {
            "expired"
        } else if self.days_to_expiry < 30 {
            "expiring soon"
        } else {
            "valid"
        }
    }
}

/// Resupply action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Resupply,
    NoResupply,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Resupply => write!(f, "resupply"),
            Action::NoResupply => write!(f, "no_resupply"),
        }
    }
}

/// Which lane produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Reasoning,
    Rule,
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionSource::Reasoning => write!(f, "reasoning"),
            DecisionSource::Rule => write!(f, "rule"),
        }
    }
}

/// The resupply decision for one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub site_id: String,
    pub action: Action,
    pub quantity: u32,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    pub source: DecisionSource,
    /// True when the site was routed to the reasoning lane but ended up on rules.
    #[serde(default)]
    pub degraded: bool,
    pub latency_ms: f64,
}

impl Decision {
    /// Whether the decision respects the per-decision invariants.
    pub fn is_consistent(&self, min_order_quantity: u32) -> bool {
        let quantity_ok = match self.action {
            Action::NoResupply => self.quantity == 0,
            Action::Resupply => self.quantity >= min_order_quantity,
        };
        quantity_ok && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Aggregate statistics handed to the reasoning service as background.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkContext {
    pub total_sites: usize,
    pub avg_inventory: f64,
    pub avg_demand: f64,
    pub avg_urgency: f64,
}

impl NetworkContext {
    pub fn from_sites(sites: &[Site]) -> Self {
        if sites.is_empty() {
            return Self::default();
        }
        let n = sites.len() as f64;
        Self {
            total_sites: sites.len(),
            avg_inventory: sites.iter().map(|s| f64::from(s.inventory)).sum::<f64>() / n,
            avg_demand: sites.iter().map(|s| f64::from(s.demand)).sum::<f64>() / n,
            avg_urgency: sites.iter().map(|s| s.urgency_score).sum::<f64>() / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> SiteRecord {
        SiteRecord {
            site_id: id.to_string(),
            site_name: None,
            region: None,
            projected_30d_demand: 100,
            current_inventory: 49,
            days_to_expiry: None,
            urgency_score: None,
            weekly_dispense_kits: 0.0,
            weekly_enrollment: vec![],
            screen_fail_rate: None,
            demand_variability: None,
        }
    }

    #[test]
    fn test_from_record_fills_defaults() {
        let site = Site::from_record(&record("S1"), 100);
        assert_eq!(site.name, "S1");
        assert_eq!(site.region, "Unknown");
        assert_eq!(site.days_to_expiry, UNKNOWN_EXPIRY_DAYS);
        assert!((site.urgency_score - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_accepts_short_aliases() {
        let json = r#"{"site_id":"S9","demand":10,"inventory":4}"#;
        let record: SiteRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.projected_30d_demand, 10);
        assert_eq!(record.current_inventory, 4);
    }

    #[test]
    fn test_net_demand_floors_at_zero() {
        let mut site = Site::from_record(&record("S1"), 20);
        site.inventory = 30;
        assert_eq!(site.net_demand(), 0);
    }

    #[test]
    fn test_expiry_status_labels() {
        let mut site = Site::from_record(&record("S1"), 1);
        site.days_to_expiry = -1;
        assert_eq!(site.expiry_status(), "expired");
        site.days_to_expiry = 29;
        assert_eq!(site.expiry_status(), "expiring soon");
        site.days_to_expiry = 30;
        assert_eq!(site.expiry_status(), "valid");
    }

    #[test]
    fn test_action_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Action::NoResupply).unwrap(),
            "\"no_resupply\""
        );
    }

    #[test]
    fn test_network_context_empty() {
        assert_eq!(NetworkContext::from_sites(&[]), NetworkContext::default());
    }
}
