//! Run input and output documents.

use crate::allocation::{AllocationPlan, Depot, DepotTarget, LogisticsCost};
use crate::dispatch::RunPhase;
use crate::forecast::EnrollmentForecast;
use crate::site::{Decision, Site, SiteRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Everything one run consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunInput {
    pub sites: Vec<SiteRecord>,
    #[serde(default)]
    pub depots: Vec<Depot>,
    /// Per-site data from external collaborators, keyed by site id.
    #[serde(default)]
    pub enrichment: HashMap<String, SiteEnrichment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteEnrichment {
    pub waste: WasteSummary,
    pub temp_excursions: ExcursionSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasteSummary {
    pub total_waste: u32,
    pub waste_by_reason: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcursionSummary {
    pub total_excursions: u32,
    pub total_quantity_affected: u32,
    pub excursion_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Whether the run could use the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Hybrid,
    RulesOnly,
}

/// Everything known about one site after the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteReport {
    pub site: Site,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<EnrollmentForecast>,
    pub waste: WasteSummary,
    pub temp_excursions: ExcursionSummary,
    pub safety_stock: u32,
    pub allocated: u64,
}

/// Headline numbers from the allocation plan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocationHeadline {
    pub total_allocated: u64,
    pub optimization_score: f64,
    pub unmet_demand_sites: usize,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_sites: usize,
    pub sites_needing_resupply: usize,
    pub total_quantity: u64,
    pub avg_projected_demand: f64,
    pub avg_latency_ms: f64,
    pub reasoning_sites: usize,
    pub rule_sites: usize,
    pub degraded_sites: usize,
    pub reasoning_percentage: f64,
    pub batch_enabled: bool,
    pub parallel: bool,
    pub selective: bool,
    pub mode: RunMode,
    pub total_waste: u64,
    pub excursion_sites: usize,
    pub allocation: AllocationHeadline,
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: RunMode,
    /// One decision per site id.
    pub decisions: BTreeMap<String, Decision>,
    /// Per-site reports in processing order.
    pub sites: Vec<SiteReport>,
    pub allocation: AllocationPlan,
    pub safety_stock: BTreeMap<String, u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depot_targets: Vec<DepotTarget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logistics_cost: Option<LogisticsCost>,
    pub phases: Vec<RunPhase>,
    pub summary: RunSummary,
}

/// Round to two decimal places for reporting.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
