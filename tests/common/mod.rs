//! Shared test utilities for clinsupply integration tests.
//!
//! Provides site builders, a fast test configuration, a scripted reasoning
//! service, and wire-format helpers for mocked reasoning endpoints.

#![allow(dead_code)]

use async_trait::async_trait;
use clinsupply::config::{ReasoningConfig, RetryConfig, SupplyConfig};
use clinsupply::reasoning::{ReasoningError, ReasoningService, Recommendation, StructuredResult};
use clinsupply::site::{Action, NetworkContext, Site, SiteRecord};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Site Builders
// =============================================================================

/// Site record with the features every run needs.
pub fn make_record(id: &str, demand: u32, inventory: u32, days_to_expiry: i32) -> SiteRecord {
    SiteRecord {
        site_id: id.to_string(),
        site_name: Some(format!("{} Clinic", id)),
        region: Some("EU".to_string()),
        projected_30d_demand: demand,
        current_inventory: inventory,
        days_to_expiry: Some(days_to_expiry),
        urgency_score: None,
        weekly_dispense_kits: f64::from(demand) / 4.0,
        weekly_enrollment: Vec::new(),
        screen_fail_rate: None,
        demand_variability: None,
    }
}

/// A site the classifier sends to the reasoning lane.
pub fn make_urgent_site(id: &str) -> Site {
    Site::from_record(&make_record(id, 120, 10, 20), 120)
}

/// A site the classifier keeps on the rule lane.
pub fn make_routine_site(id: &str) -> Site {
    Site::from_record(&make_record(id, 10, 400, 365), 10)
}

// =============================================================================
// Configuration
// =============================================================================

/// Defaults with every wait shortened for tests.
pub fn test_config() -> SupplyConfig {
    let mut config = SupplyConfig::default();
    config.dispatch.inter_batch_delay_ms = 0;
    config.reasoning.retry = fast_retry(2);
    config
}

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        rate_limit_factor: 1.5,
        jitter_ms: 0,
    }
}

/// Reasoning config pointed at a mock server, no fallbacks, fast retries.
pub fn reasoning_config(base_url: &str) -> ReasoningConfig {
    ReasoningConfig {
        base_url: base_url.to_string(),
        model: "primary-model".to_string(),
        fallback_models: Vec::new(),
        credential_env: Vec::new(),
        timeout_seconds: 5,
        temperature: 0.0,
        retry: fast_retry(1),
        ..Default::default()
    }
}

// =============================================================================
// Wire Helpers
// =============================================================================

/// generateContent response whose first candidate carries `text`.
pub fn candidate_body(text: &str) -> Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}

/// Single-site payload text.
pub fn single_payload(action: &str, quantity: u32, confidence: f64) -> String {
    json!({
        "structured_result": {
            "action": action,
            "quantity": quantity,
            "confidence": confidence,
            "reasons": ["scripted"]
        },
        "draft_message": "scripted justification"
    })
    .to_string()
}

/// Batch payload text with one resupply item per id.
pub fn batch_payload(ids: &[&str], quantity: u32) -> String {
    let items: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({
                "site_id": id,
                "structured_result": {
                    "action": "resupply",
                    "quantity": quantity,
                    "confidence": 0.8,
                    "reasons": ["scripted"]
                },
                "draft_message": format!("justification for {}", id)
            })
        })
        .collect();
    Value::Array(items).to_string()
}

// =============================================================================
// Scripted Reasoning Service
// =============================================================================

/// Reasoning service that resupplies a fixed quantity, failing for
/// selected site ids or for every call.
pub struct ScriptedService {
    pub quantity: u32,
    pub fail_all: bool,
    pub fail_ids: HashSet<String>,
    pub single_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl ScriptedService {
    pub fn resupplying(quantity: u32) -> Arc<Self> {
        Arc::new(Self {
            quantity,
            fail_all: false,
            fail_ids: HashSet::new(),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            quantity: 0,
            fail_all: true,
            fail_ids: HashSet::new(),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    pub fn failing_for(quantity: u32, ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            quantity,
            fail_all: false,
            fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            single_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        })
    }

    pub fn as_service(self: &Arc<Self>) -> Arc<dyn ReasoningService> {
        self.clone()
    }

    pub fn total_calls(&self) -> usize {
        self.single_calls.load(Ordering::SeqCst) + self.batch_calls.load(Ordering::SeqCst)
    }

    fn fails(&self, site: &Site) -> bool {
        self.fail_all || self.fail_ids.contains(&site.id)
    }

    fn recommendation(&self, site: &Site) -> Recommendation {
        Recommendation {
            site_id: site.id.clone(),
            result: StructuredResult {
                action: Action::Resupply,
                quantity: self.quantity,
                confidence: 0.85,
                reasons: vec!["scripted".to_string()],
            },
            justification: format!("scripted for {}", site.id),
            patched: false,
        }
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn recommend(
        &self,
        site: &Site,
        _context: &NetworkContext,
    ) -> Result<Recommendation, ReasoningError> {
        self.single_calls.fetch_add(1, Ordering::SeqCst);
        if self.fails(site) {
            return Err(ReasoningError::Upstream {
                status: 500,
                message: format!("scripted failure for {}", site.id),
            });
        }
        Ok(self.recommendation(site))
    }

    async fn recommend_batch(
        &self,
        sites: &[Site],
        _context: &NetworkContext,
    ) -> Result<Vec<Recommendation>, ReasoningError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if sites.iter().any(|s| self.fails(s)) {
            return Err(ReasoningError::MalformedResponse(
                "scripted batch failure".to_string(),
            ));
        }
        Ok(sites.iter().map(|s| self.recommendation(s)).collect())
    }
}

// =============================================================================
// Slow Reasoning Service
// =============================================================================

/// Reasoning service that takes `delay` per call and records how many calls
/// overlap and when each batch call starts.
pub struct SlowService {
    pub delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    batch_starts: Mutex<Vec<Instant>>,
}

impl SlowService {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            batch_starts: Mutex::new(Vec::new()),
        })
    }

    pub fn as_service(self: &Arc<Self>) -> Arc<dyn ReasoningService> {
        self.clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn batch_starts(&self) -> Vec<Instant> {
        self.batch_starts.lock().unwrap().clone()
    }

    async fn work(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn recommendation(site: &Site) -> Recommendation {
        Recommendation {
            site_id: site.id.clone(),
            result: StructuredResult {
                action: Action::Resupply,
                quantity: 40,
                confidence: 0.9,
                reasons: vec!["slow".to_string()],
            },
            justification: format!("slow answer for {}", site.id),
            patched: false,
        }
    }
}

#[async_trait]
impl ReasoningService for SlowService {
    async fn recommend(
        &self,
        site: &Site,
        _context: &NetworkContext,
    ) -> Result<Recommendation, ReasoningError> {
        self.work().await;
        Ok(Self::recommendation(site))
    }

    async fn recommend_batch(
        &self,
        sites: &[Site],
        _context: &NetworkContext,
    ) -> Result<Vec<Recommendation>, ReasoningError> {
        self.batch_starts.lock().unwrap().push(Instant::now());
        self.work().await;
        Ok(sites.iter().map(Self::recommendation).collect())
    }
}
