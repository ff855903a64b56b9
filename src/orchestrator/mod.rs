//! One end-to-end run.
//!
//! Preparation (forecast adjustment, defaults, de-duplication, priority
//! order), two-lane dispatch, enrichment merge, and downstream allocation.

pub mod document;

pub use document::{
    AllocationHeadline, ExcursionSummary, RunInput, RunMode, RunOutput, RunSummary,
    SiteEnrichment, SiteReport, WasteSummary,
};

use crate::allocation::{AllocationOptimizer, AllocationPlan, Depot, SafetyStockInput, SiteDemand};
use crate::config::{ConfigError, SupplyConfig};
use crate::dispatch::{DispatchOutcome, DispatchScheduler};
use crate::forecast::{self, EnrollmentForecast};
use crate::reasoning::{ReasoningService, ResilientReasoningClient};
use crate::site::{Action, Decision, DecisionSource, NetworkContext, Site, SiteRecord};
use document::round2;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Conditions that stop a run before dispatch.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(String),
}

/// A site ready for dispatch plus its forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSite {
    pub site: Site,
    pub forecast: Option<EnrollmentForecast>,
}

/// Composes classification, dispatch and allocation into one run.
pub struct Orchestrator {
    config: SupplyConfig,
    reasoning: Option<Arc<dyn ReasoningService>>,
    optimizer: AllocationOptimizer,
}

impl Orchestrator {
    /// Build an orchestrator, connecting the reasoning client from the
    /// environment. Without credentials the run is rules-only.
    pub fn new(config: SupplyConfig) -> Result<Self, RunError> {
        config.validate()?;
        let reasoning: Option<Arc<dyn ReasoningService>> =
            match ResilientReasoningClient::from_env(config.reasoning.clone()) {
                Ok(client) => Some(Arc::new(
                    client.with_prompt_logging(config.logging.log_prompts),
                )),
                Err(e) => {
                    tracing::warn!(error = %e, "reasoning unavailable, running rules only");
                    None
                }
            };
        Ok(Self::assemble(config, reasoning))
    }

    /// Build an orchestrator that never consults the reasoning service.
    pub fn rules_only(config: SupplyConfig) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self::assemble(config, None))
    }

    /// Build an orchestrator around a given reasoning service.
    pub fn with_reasoning(
        config: SupplyConfig,
        reasoning: Arc<dyn ReasoningService>,
    ) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self::assemble(config, Some(reasoning)))
    }

    fn assemble(config: SupplyConfig, reasoning: Option<Arc<dyn ReasoningService>>) -> Self {
        let optimizer = AllocationOptimizer::new(config.allocation.clone());
        Self {
            config,
            reasoning,
            optimizer,
        }
    }

    pub fn mode(&self) -> RunMode {
        if self.reasoning.is_some() {
            RunMode::Hybrid
        } else {
            RunMode::RulesOnly
        }
    }

    pub fn config(&self) -> &SupplyConfig {
        &self.config
    }

    /// Apply forecasts and defaults, drop duplicate ids, and order sites by
    /// urgency (descending) then days to expiry (ascending).
    pub fn prepare(&self, records: &[SiteRecord]) -> Result<Vec<PreparedSite>, RunError> {
        let mut seen = HashSet::with_capacity(records.len());
        let mut prepared = Vec::with_capacity(records.len());

        for record in records {
            if record.site_id.trim().is_empty() {
                return Err(RunError::Input("site record with empty site_id".to_string()));
            }
            if !seen.insert(record.site_id.as_str()) {
                tracing::warn!(site_id = %record.site_id, "duplicate site id, keeping first record");
                continue;
            }
            let forecast = forecast::forecast(&record.weekly_enrollment, record.screen_fail_rate);
            let demand = forecast
                .as_ref()
                .map(|f| f.adjust_demand(record.projected_30d_demand))
                .unwrap_or(record.projected_30d_demand);
            if demand != record.projected_30d_demand {
                tracing::debug!(
                    site_id = %record.site_id,
                    base = record.projected_30d_demand,
                    adjusted = demand,
                    "demand raised by enrollment forecast"
                );
            }
            prepared.push(PreparedSite {
                site: Site::from_record(record, demand),
                forecast,
            });
        }

        prepared.sort_by(|a, b| {
            b.site
                .urgency_score
                .total_cmp(&a.site.urgency_score)
                .then_with(|| a.site.days_to_expiry.cmp(&b.site.days_to_expiry))
        });
        Ok(prepared)
    }

    /// Execute one run.
    pub async fn run(&self, input: RunInput) -> Result<RunOutput, RunError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, input).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, input: RunInput) -> Result<RunOutput, RunError> {
        let started_at = chrono::Utc::now();
        let mode = self.mode();
        tracing::info!(sites = input.sites.len(), ?mode, "run started");

        let prepared = self.prepare(&input.sites)?;
        let sites: Vec<Site> = prepared.iter().map(|p| p.site.clone()).collect();
        let context = NetworkContext::from_sites(&sites);

        let scheduler = DispatchScheduler::new(&self.config, self.reasoning.clone());
        let DispatchOutcome {
            decisions,
            degraded_sites,
            phases,
            ..
        } = scheduler.run(&sites, &context).await;

        let depots = self.depots_for(&input.depots, &decisions);
        let demands: Vec<SiteDemand> = decisions
            .iter()
            .filter(|d| d.action == Action::Resupply)
            .map(|d| SiteDemand::new(d.site_id.clone(), d.quantity, 0))
            .collect();
        let allocation = self.optimizer.allocate(&demands, &depots);
        let safety_stock = self.optimizer.safety_stock(&safety_inputs(&sites, &depots));

        let depot_targets = if depots.iter().any(|d| d.capacity.is_some()) {
            let total_demand = sites.iter().map(|s| u64::from(s.demand)).sum();
            self.optimizer.depot_targets(&depots, total_demand)
        } else {
            Vec::new()
        };
        let logistics_cost = depots
            .iter()
            .any(|d| !d.shipping_costs.is_empty())
            .then(|| self.optimizer.logistics_cost(&allocation, &depots));

        let reports = merge_reports(
            prepared,
            &decisions,
            &input.enrichment,
            &safety_stock,
            &allocation,
        );
        let summary = self.summarize(&reports, degraded_sites, mode, &allocation);
        let decisions: BTreeMap<String, Decision> = decisions
            .into_iter()
            .map(|d| (d.site_id.clone(), d))
            .collect();

        tracing::info!(
            sites = summary.total_sites,
            resupply = summary.sites_needing_resupply,
            reasoning = summary.reasoning_sites,
            degraded = summary.degraded_sites,
            allocated = allocation.total_allocated,
            "run complete"
        );

        Ok(RunOutput {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            mode,
            decisions,
            sites: reports,
            allocation,
            safety_stock,
            depot_targets,
            logistics_cost,
            phases,
            summary,
        })
    }

    /// Depots from the input, or one synthesised depot holding a multiple
    /// of total resupply demand with the default lead time to every
    /// resupply site.
    fn depots_for(&self, supplied: &[Depot], decisions: &[Decision]) -> Vec<Depot> {
        if !supplied.is_empty() {
            return supplied.to_vec();
        }
        let cfg = &self.config.allocation;
        let resupply: Vec<&Decision> = decisions
            .iter()
            .filter(|d| d.action == Action::Resupply)
            .collect();
        let total: u64 = resupply.iter().map(|d| u64::from(d.quantity)).sum();
        let inventory = (total * u64::from(cfg.default_depot_multiplier)).min(u64::from(u32::MAX));
        vec![Depot {
            depot_id: cfg.default_depot_id.clone(),
            inventory: inventory as u32,
            capacity: None,
            holding_cost: None,
            reorder_point: None,
            lead_times: resupply
                .iter()
                .map(|d| (d.site_id.clone(), cfg.default_lead_time_days))
                .collect(),
            shipping_costs: HashMap::new(),
        }]
    }

    fn summarize(
        &self,
        reports: &[SiteReport],
        degraded_sites: usize,
        mode: RunMode,
        allocation: &AllocationPlan,
    ) -> RunSummary {
        let total = reports.len();
        let n = total.max(1) as f64;
        let reasoning_sites = reports
            .iter()
            .filter(|r| r.decision.source == DecisionSource::Reasoning)
            .count();

        RunSummary {
            total_sites: total,
            sites_needing_resupply: reports
                .iter()
                .filter(|r| r.decision.action == Action::Resupply)
                .count(),
            total_quantity: reports.iter().map(|r| u64::from(r.decision.quantity)).sum(),
            avg_projected_demand: round2(
                reports.iter().map(|r| f64::from(r.site.demand)).sum::<f64>() / n,
            ),
            avg_latency_ms: round2(reports.iter().map(|r| r.decision.latency_ms).sum::<f64>() / n),
            reasoning_sites,
            rule_sites: total - reasoning_sites,
            degraded_sites,
            reasoning_percentage: if total == 0 {
                0.0
            } else {
                round2(reasoning_sites as f64 * 100.0 / total as f64)
            },
            batch_enabled: self.config.dispatch.uses_batches(),
            parallel: self.config.dispatch.parallel,
            selective: self.config.routing.selective,
            mode,
            total_waste: reports.iter().map(|r| u64::from(r.waste.total_waste)).sum(),
            excursion_sites: reports
                .iter()
                .filter(|r| r.temp_excursions.total_excursions > 0)
                .count(),
            allocation: AllocationHeadline {
                total_allocated: allocation.total_allocated,
                optimization_score: round2(allocation.optimization_score),
                unmet_demand_sites: allocation.unmet_demand.len(),
            },
        }
    }
}

/// Weekly demand from 30-day demand, the best lead time over all depots.
fn safety_inputs(sites: &[Site], depots: &[Depot]) -> Vec<SafetyStockInput> {
    sites
        .iter()
        .map(|site| SafetyStockInput {
            site_id: site.id.clone(),
            weekly_demand: f64::from(site.demand) * 7.0 / 30.0,
            lead_time_days: depots
                .iter()
                .filter_map(|d| d.lead_times.get(&site.id).copied())
                .min(),
            variability: site.demand_variability,
        })
        .collect()
}

fn merge_reports(
    prepared: Vec<PreparedSite>,
    decisions: &[Decision],
    enrichment: &HashMap<String, SiteEnrichment>,
    safety_stock: &BTreeMap<String, u32>,
    allocation: &AllocationPlan,
) -> Vec<SiteReport> {
    prepared
        .into_iter()
        .zip(decisions)
        .map(|(p, decision)| {
            let extra = enrichment.get(&p.site.id).cloned().unwrap_or_default();
            SiteReport {
                safety_stock: safety_stock.get(&p.site.id).copied().unwrap_or(0),
                allocated: allocation.allocated_to(&p.site.id),
                site: p.site,
                decision: decision.clone(),
                forecast: p.forecast,
                waste: extra.waste,
                temp_excursions: extra.temp_excursions,
            }
        })
        .collect()
}
