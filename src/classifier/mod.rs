//! Lane classification.
//!
//! Decides per site whether the reasoning service is worth a call, and carries
//! the run-scoped circuit breaker that closes the reasoning lane after repeated
//! failures.

use crate::config::RoutingConfig;
use crate::site::Site;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Processing lane for a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Reasoning,
    Rule,
}

/// Why a site ended up in its lane. Logged with each classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneReason {
    ReasoningUnavailable,
    BreakerOpen,
    SelectiveRoutingOff,
    HighUrgency,
    NearExpiry,
    InventoryBelowDemand,
    Routine,
}

/// Counts consecutive reasoning failures for one run.
///
/// Shared between the classifier and every in-flight reasoning task, so the
/// counter is atomic. Any success resets it.
#[derive(Debug)]
pub struct FailureBreaker {
    consecutive: AtomicU32,
    budget: u32,
}

impl FailureBreaker {
    pub fn new(budget: u32) -> Self {
        Self {
            consecutive: AtomicU32::new(0),
            budget,
        }
    }

    /// Whether the reasoning lane is closed for the rest of the run.
    pub fn is_open(&self) -> bool {
        self.consecutive.load(Ordering::SeqCst) >= self.budget
    }

    pub fn record_failure(&self) -> u32 {
        let failures = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!(crate::metrics::BREAKER_FAILURES).set(f64::from(failures));
        if failures == self.budget {
            tracing::warn!(
                failures,
                budget = self.budget,
                "reasoning failure budget exhausted, remaining sites use rules"
            );
        }
        failures
    }

    pub fn record_success(&self) {
        self.consecutive.store(0, Ordering::SeqCst);
        metrics::gauge!(crate::metrics::BREAKER_FAILURES).set(0.0);
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }
}

/// Routes sites to the reasoning or rule lane.
#[derive(Debug, Clone)]
pub struct SiteClassifier {
    config: RoutingConfig,
    reasoning_available: bool,
    breaker: Arc<FailureBreaker>,
}

impl SiteClassifier {
    pub fn new(config: RoutingConfig, reasoning_available: bool) -> Self {
        let breaker = Arc::new(FailureBreaker::new(config.failure_budget));
        Self {
            config,
            reasoning_available,
            breaker,
        }
    }

    /// The breaker shared with dispatch.
    pub fn breaker(&self) -> Arc<FailureBreaker> {
        Arc::clone(&self.breaker)
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Whether a fresh reasoning call may be started right now.
    pub fn admits_reasoning(&self) -> bool {
        self.reasoning_available && !self.breaker.is_open()
    }

    /// Classify one site. The first matching rule wins.
    pub fn classify(&self, site: &Site) -> (Lane, LaneReason) {
        if !self.reasoning_available {
            return (Lane::Rule, LaneReason::ReasoningUnavailable);
        }
        if self.breaker.is_open() {
            return (Lane::Rule, LaneReason::BreakerOpen);
        }
        if !self.config.selective {
            return (Lane::Reasoning, LaneReason::SelectiveRoutingOff);
        }
        if site.urgency_score >= self.config.urgency_priority {
            return (Lane::Reasoning, LaneReason::HighUrgency);
        }
        if site.days_to_expiry <= self.config.expiry_days {
            return (Lane::Reasoning, LaneReason::NearExpiry);
        }
        if site.inventory < site.demand {
            return (Lane::Reasoning, LaneReason::InventoryBelowDemand);
        }
        (Lane::Rule, LaneReason::Routine)
    }
}
