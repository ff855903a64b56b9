//! Two-lane dispatch.
//!
//! A run walks `Classify -> DispatchReasoning -> DispatchRules -> Merge -> Done`.
//! Reasoning-lane sites go to the [`ReasoningService`] either in fixed-size
//! batches with a pause between calls, or one by one under a concurrency
//! ceiling. Rule-lane sites fan out without limits beyond a small pool. Any
//! reasoning failure degrades the affected sites to the rule engine; nothing
//! here aborts a run.

use crate::classifier::{Lane, SiteClassifier};
use crate::config::{DispatchConfig, SupplyConfig};
use crate::reasoning::{Recommendation, ReasoningService};
use crate::rules::RuleEngine;
use crate::site::{Decision, DecisionSource, NetworkContext, Site};
use futures::stream::{self, FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Phase of a dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Classify,
    DispatchReasoning,
    DispatchRules,
    Merge,
    Done,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Classify => "classify",
            RunPhase::DispatchReasoning => "dispatch_reasoning",
            RunPhase::DispatchRules => "dispatch_rules",
            RunPhase::Merge => "merge",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Result of one dispatch run.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// One decision per input site, in input order.
    pub decisions: Vec<Decision>,
    /// Sites classified into the reasoning lane.
    pub reasoning_sites: usize,
    /// Sites classified into the rule lane.
    pub rule_sites: usize,
    /// Reasoning-lane sites that ended up on rules.
    pub degraded_sites: usize,
    /// Phases visited, in order.
    pub phases: Vec<RunPhase>,
}

/// Executes both lanes for a set of sites.
pub struct DispatchScheduler {
    config: DispatchConfig,
    classifier: SiteClassifier,
    rules: RuleEngine,
    reasoning: Option<Arc<dyn ReasoningService>>,
}

impl DispatchScheduler {
    /// Build a scheduler. Without a reasoning service every site takes the rule lane.
    pub fn new(config: &SupplyConfig, reasoning: Option<Arc<dyn ReasoningService>>) -> Self {
        Self {
            config: config.dispatch.clone(),
            classifier: SiteClassifier::new(config.routing.clone(), reasoning.is_some()),
            rules: RuleEngine::new(config.rules.clone()),
            reasoning,
        }
    }

    pub fn classifier(&self) -> &SiteClassifier {
        &self.classifier
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    fn enter(phases: &mut Vec<RunPhase>, phase: RunPhase) {
        tracing::debug!(phase = %phase, "dispatch phase");
        phases.push(phase);
    }

    fn degrade(&self, site: &Site, cause: &str, scope: &'static str) -> Decision {
        metrics::counter!(crate::metrics::DEGRADED_SITES, "scope" => scope).increment(1);
        self.rules.degrade(site, cause)
    }

    /// Run both lanes over `sites` and merge the results.
    pub async fn run(&self, sites: &[Site], context: &NetworkContext) -> DispatchOutcome {
        let mut phases = Vec::with_capacity(5);

        Self::enter(&mut phases, RunPhase::Classify);
        let mut reasoning_idx = Vec::new();
        let mut rule_idx = Vec::new();
        for (i, site) in sites.iter().enumerate() {
            let (lane, reason) = self.classifier.classify(site);
            tracing::debug!(site_id = %site.id, ?lane, ?reason, "classified");
            match lane {
                Lane::Reasoning => reasoning_idx.push(i),
                Lane::Rule => rule_idx.push(i),
            }
        }
        tracing::info!(
            sites = sites.len(),
            reasoning = reasoning_idx.len(),
            rules = rule_idx.len(),
            "sites classified"
        );

        Self::enter(&mut phases, RunPhase::DispatchReasoning);
        let mut results: Vec<(usize, Decision)> = match &self.reasoning {
            Some(service) if !reasoning_idx.is_empty() => {
                if self.config.uses_batches() {
                    self.dispatch_batches(sites, &reasoning_idx, context, service.as_ref())
                        .await
                } else {
                    self.dispatch_individual(sites, &reasoning_idx, context, service.as_ref())
                        .await
                }
            }
            _ => reasoning_idx
                .iter()
                .map(|&i| (i, self.degrade(&sites[i], "reasoning service not configured", "site")))
                .collect(),
        };

        Self::enter(&mut phases, RunPhase::DispatchRules);
        results.extend(self.dispatch_rules(sites, &rule_idx).await);

        Self::enter(&mut phases, RunPhase::Merge);
        let decisions = self.merge(sites, results);
        let degraded_sites = decisions.iter().filter(|d| d.degraded).count();
        for decision in &decisions {
            let source = match decision.source {
                DecisionSource::Reasoning => "reasoning",
                DecisionSource::Rule => "rule",
            };
            metrics::counter!(crate::metrics::DECISIONS, "source" => source).increment(1);
        }

        Self::enter(&mut phases, RunPhase::Done);
        tracing::info!(
            decisions = decisions.len(),
            degraded = degraded_sites,
            breaker_failures = self.classifier.breaker().consecutive_failures(),
            "dispatch complete"
        );

        DispatchOutcome {
            decisions,
            reasoning_sites: reasoning_idx.len(),
            rule_sites: rule_idx.len(),
            degraded_sites,
            phases,
        }
    }

    /// Sequential batches with a fixed pause between calls. A failed batch
    /// degrades all of its sites.
    async fn dispatch_batches(
        &self,
        sites: &[Site],
        indices: &[usize],
        context: &NetworkContext,
        service: &dyn ReasoningService,
    ) -> Vec<(usize, Decision)> {
        let breaker = self.classifier.breaker();
        let min_order = self.rules.min_order_quantity();
        let mut out = Vec::with_capacity(indices.len());
        let mut called = false;

        for (batch_no, chunk) in indices.chunks(self.config.batch_size).enumerate() {
            if breaker.is_open() {
                out.extend(
                    chunk
                        .iter()
                        .map(|&i| (i, self.degrade(&sites[i], "circuit breaker open", "breaker"))),
                );
                continue;
            }
            if called {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
            called = true;

            let batch: Vec<Site> = chunk.iter().map(|&i| sites[i].clone()).collect();
            let start = Instant::now();
            let result = service.recommend_batch(&batch, context).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            // Even split of the call's wall-clock time across its members.
            let per_site_ms = elapsed_ms / chunk.len() as f64;

            match result {
                Ok(recommendations) => {
                    breaker.record_success();
                    let mut by_id: HashMap<String, Recommendation> = recommendations
                        .into_iter()
                        .map(|r| (r.site_id.clone(), r))
                        .collect();
                    for &i in chunk {
                        let site = &sites[i];
                        let rec = by_id
                            .remove(&site.id)
                            .unwrap_or_else(|| Recommendation::missing(&site.id));
                        out.push((i, rec.into_decision(min_order, per_site_ms)));
                    }
                    tracing::info!(
                        batch = batch_no,
                        sites = chunk.len(),
                        latency_ms = elapsed_ms as u64,
                        "batch complete"
                    );
                }
                Err(e) => {
                    breaker.record_failure();
                    tracing::warn!(
                        batch = batch_no,
                        sites = chunk.len(),
                        error = %e,
                        "batch failed, degrading to rules"
                    );
                    let cause = e.to_string();
                    for &i in chunk {
                        let mut decision = self.degrade(&sites[i], &cause, "batch");
                        decision.latency_ms = per_site_ms;
                        out.push((i, decision));
                    }
                }
            }
        }
        out
    }

    /// One call per site, at most `reasoning_pool()` in flight. A failure
    /// degrades only its own site.
    async fn dispatch_individual(
        &self,
        sites: &[Site],
        indices: &[usize],
        context: &NetworkContext,
        service: &dyn ReasoningService,
    ) -> Vec<(usize, Decision)> {
        let semaphore = Semaphore::new(self.config.reasoning_pool());
        let breaker = self.classifier.breaker();
        let min_order = self.rules.min_order_quantity();

        let mut in_flight: FuturesUnordered<_> = indices
            .iter()
            .map(|&i| {
                let semaphore = &semaphore;
                let breaker = &breaker;
                async move {
                    let site = &sites[i];
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (i, self.degrade(site, "dispatch pool closed", "site")),
                    };
                    if breaker.is_open() {
                        return (i, self.degrade(site, "circuit breaker open", "breaker"));
                    }

                    let start = Instant::now();
                    let result = service.recommend(site, context).await;
                    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                    match result {
                        Ok(rec) => {
                            breaker.record_success();
                            (i, rec.into_decision(min_order, latency_ms))
                        }
                        Err(e) => {
                            breaker.record_failure();
                            tracing::warn!(site_id = %site.id, error = %e, "site failed, degrading to rules");
                            let mut decision = self.degrade(site, &e.to_string(), "site");
                            decision.latency_ms = latency_ms;
                            (i, decision)
                        }
                    }
                }
            })
            .collect();

        let mut out = Vec::with_capacity(indices.len());
        while let Some(result) = in_flight.next().await {
            out.push(result);
        }
        out
    }

    async fn dispatch_rules(&self, sites: &[Site], indices: &[usize]) -> Vec<(usize, Decision)> {
        if !self.config.parallel {
            return indices
                .iter()
                .map(|&i| (i, self.rules.decide(&sites[i])))
                .collect();
        }
        stream::iter(indices.iter().copied())
            .map(|i| async move { (i, self.rules.decide(&sites[i])) })
            .buffer_unordered(self.config.rule_pool())
            .collect()
            .await
    }

    /// Re-associate results with sites by id and emit one decision per site in
    /// input order. A site with no result gets a degraded rule decision.
    fn merge(&self, sites: &[Site], results: Vec<(usize, Decision)>) -> Vec<Decision> {
        let mut by_id: HashMap<String, Decision> = HashMap::with_capacity(results.len());
        for (i, decision) in results {
            if decision.site_id != sites[i].id {
                tracing::warn!(
                    expected = %sites[i].id,
                    got = %decision.site_id,
                    "result carried the wrong site id, discarding"
                );
                continue;
            }
            by_id.entry(decision.site_id.clone()).or_insert(decision);
        }

        sites
            .iter()
            .map(|site| {
                by_id
                    .remove(&site.id)
                    .unwrap_or_else(|| self.degrade(site, "no result produced", "merge"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::{ReasoningError, StructuredResult};
    use crate::site::Action;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resupplies 42 for every site, or fails every call.
    struct Fixed {
        fail: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }

        fn service(self: &Arc<Self>) -> Option<Arc<dyn ReasoningService>> {
            Some(self.clone())
        }

        fn rec(site: &Site) -> Recommendation {
            Recommendation {
                site_id: site.id.clone(),
                result: StructuredResult {
                    action: Action::Resupply,
                    quantity: 42,
                    confidence: 0.9,
                    reasons: vec!["scripted".into()],
                },
                justification: "scripted".into(),
                patched: false,
            }
        }
    }

    #[async_trait]
    impl ReasoningService for Fixed {
        async fn recommend(
            &self,
            site: &Site,
            _context: &NetworkContext,
        ) -> Result<Recommendation, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReasoningError::Upstream {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(Self::rec(site))
        }

        async fn recommend_batch(
            &self,
            sites: &[Site],
            _context: &NetworkContext,
        ) -> Result<Vec<Recommendation>, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ReasoningError::MalformedResponse("garbage".into()));
            }
            // Reverse to check re-association by id.
            Ok(sites.iter().rev().map(Self::rec).collect())
        }
    }

    fn urgent(id: &str) -> Site {
        Site {
            id: id.to_string(),
            name: id.to_string(),
            region: "NA".to_string(),
            demand: 100,
            inventory: 10,
            days_to_expiry: 20,
            urgency_score: 9.0,
            weekly_dispense_kits: 20.0,
            demand_variability: None,
        }
    }

    fn routine(id: &str) -> Site {
        Site {
            demand: 10,
            inventory: 500,
            days_to_expiry: 400,
            urgency_score: 0.02,
            ..urgent(id)
        }
    }

    fn config() -> SupplyConfig {
        let mut config = SupplyConfig::default();
        config.dispatch.inter_batch_delay_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_lanes_split_and_order_preserved() {
        let service = Fixed::new(false);
        let scheduler = DispatchScheduler::new(&config(), service.service());
        let sites = vec![urgent("A"), routine("B"), urgent("C")];

        let outcome = scheduler.run(&sites, &NetworkContext::default()).await;

        let ids: Vec<&str> = outcome.decisions.iter().map(|d| d.site_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(outcome.decisions[0].source, DecisionSource::Reasoning);
        assert_eq!(outcome.decisions[0].quantity, 42);
        assert_eq!(outcome.decisions[1].source, DecisionSource::Rule);
        assert_eq!(outcome.reasoning_sites, 2);
        assert_eq!(outcome.rule_sites, 1);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.phases,
            vec![
                RunPhase::Classify,
                RunPhase::DispatchReasoning,
                RunPhase::DispatchRules,
                RunPhase::Merge,
                RunPhase::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_whole_batch() {
        let scheduler = DispatchScheduler::new(&config(), Fixed::new(true).service());
        let sites: Vec<Site> = (0..4).map(|n| urgent(&format!("S{}", n))).collect();

        let outcome = scheduler.run(&sites, &NetworkContext::default()).await;

        assert_eq!(outcome.decisions.len(), 4);
        assert!(outcome
            .decisions
            .iter()
            .all(|d| d.source == DecisionSource::Rule && d.degraded));
        assert_eq!(outcome.degraded_sites, 4);
    }

    #[tokio::test]
    async fn test_breaker_stops_calls_after_budget() {
        let service = Fixed::new(true);
        let mut config = config();
        config.dispatch.batch_size = 2;
        let scheduler = DispatchScheduler::new(&config, service.service());
        let sites: Vec<Site> = (0..10).map(|n| urgent(&format!("S{}", n))).collect();

        let outcome = scheduler.run(&sites, &NetworkContext::default()).await;

        // Three failing batches open the breaker; the remaining two are never sent.
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.decisions.len(), 10);
        assert_eq!(outcome.degraded_sites, 10);
    }

    #[tokio::test]
    async fn test_individual_mode_calls_each_site() {
        let service = Fixed::new(false);
        let mut config = config();
        config.dispatch.batch_enabled = false;
        let scheduler = DispatchScheduler::new(&config, service.service());
        let sites: Vec<Site> = (0..7).map(|n| urgent(&format!("S{}", n))).collect();

        let outcome = scheduler.run(&sites, &NetworkContext::default()).await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 7);
        assert!(outcome
            .decisions
            .iter()
            .all(|d| d.source == DecisionSource::Reasoning));
    }

    #[tokio::test]
    async fn test_without_service_everything_uses_rules() {
        let scheduler = DispatchScheduler::new(&config(), None);
        let sites = vec![urgent("A"), routine("B")];

        let outcome = scheduler.run(&sites, &NetworkContext::default()).await;

        assert_eq!(outcome.reasoning_sites, 0);
        assert!(outcome
            .decisions
            .iter()
            .all(|d| d.source == DecisionSource::Rule && !d.degraded));
    }

    #[tokio::test]
    async fn test_sequential_rules_match_parallel() {
        let mut sequential = config();
        sequential.dispatch.parallel = false;
        let sites: Vec<Site> = (0..5).map(|n| routine(&format!("R{}", n))).collect();

        let a = DispatchScheduler::new(&sequential, None)
            .run(&sites, &NetworkContext::default())
            .await;
        let b = DispatchScheduler::new(&config(), None)
            .run(&sites, &NetworkContext::default())
            .await;
        assert_eq!(a.decisions, b.decisions);
    }
}
