//! Reasoning service client.
//!
//! [`ResilientReasoningClient`] calls a `generateContent` endpoint and hides
//! credential rotation, model fallback and retry from callers. Each logical
//! call is an explicit loop over (model, credential) attempts:
//!
//! - 429 / 503 / timeout: the credential cools down and the same request is
//!   sent with the next available credential, once per swap
//! - 404: the model is unavailable; the next model in the fallback chain is
//!   tried with the same credential
//! - anything else: the attempt fails and the outer retry loop decides
//!
//! The outer loop retries the whole logical call with exponential backoff.

pub mod credentials;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod retry;

pub use credentials::{CredentialPool, CredentialStatus, FailureClass, REDACTED};
pub use error::{ReasoningError, TransientKind};
pub use parse::{ParsedResponse, Recommendation, StructuredResult};
pub use retry::RetryPolicy;

use crate::config::ReasoningConfig;
use crate::site::{NetworkContext, Site};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Source of recommendations for reasoning-lane sites.
///
/// Implemented by [`ResilientReasoningClient`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Recommendation for one site.
    async fn recommend(
        &self,
        site: &Site,
        context: &NetworkContext,
    ) -> Result<Recommendation, ReasoningError>;

    /// Recommendations for several sites in one call, in the order of `sites`.
    async fn recommend_batch(
        &self,
        sites: &[Site],
        context: &NetworkContext,
    ) -> Result<Vec<Recommendation>, ReasoningError>;
}

/// Resilient client for the remote reasoning endpoint.
///
/// Owns its credential state; one instance serves one run.
pub struct ResilientReasoningClient {
    config: ReasoningConfig,
    model: String,
    pool: CredentialPool,
    retry: RetryPolicy,
    client: Client,
    log_prompts: bool,
}

impl std::fmt::Debug for ResilientReasoningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientReasoningClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.model)
            .field("credentials", &self.pool.len())
            .finish()
    }
}

impl ResilientReasoningClient {
    /// Build a client from explicit credential values.
    pub fn new(config: ReasoningConfig, credentials: Vec<String>) -> Result<Self, ReasoningError> {
        let pool = CredentialPool::new(credentials, config.cooldown.clone())?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ReasoningError::Configuration(format!("HTTP client: {}", e)))?;
        let model = config.normalized_model();
        let retry = RetryPolicy::new(config.retry.clone());

        tracing::info!(
            model = %model,
            credentials = pool.len(),
            fallbacks = config.fallback_models.len(),
            "reasoning client ready"
        );

        Ok(Self {
            config,
            model,
            pool,
            retry,
            client,
            log_prompts: false,
        })
    }

    /// Build a client with credentials read from the configured environment variables.
    pub fn from_env(config: ReasoningConfig) -> Result<Self, ReasoningError> {
        let credentials = config.resolve_credentials();
        Self::new(config, credentials)
    }

    /// Emit full prompts at debug level.
    pub fn with_prompt_logging(mut self, enabled: bool) -> Self {
        self.log_prompts = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn credential_status(&self) -> Vec<CredentialStatus> {
        self.pool.snapshot()
    }

    fn endpoint(&self, model: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if base.ends_with("/models") {
            format!("{}/{}:generateContent", base, model)
        } else {
            format!("{}/models/{}:generateContent", base, model)
        }
    }

    /// Next model to try after `failed` returned 404, skipping anything
    /// already tried.
    fn next_model(&self, failed: &str, tried: &[String]) -> Option<String> {
        let untried = |m: &str| !m.is_empty() && !tried.iter().any(|t| t == m);
        if let Some(stripped) = failed.strip_suffix("-latest") {
            if untried(stripped) {
                return Some(stripped.to_string());
            }
        }
        self.config
            .fallback_models
            .iter()
            .map(|m| m.trim().trim_start_matches("models/"))
            .find(|m| untried(m))
            .map(str::to_string)
    }

    /// One HTTP round trip.
    async fn post(&self, model: &str, credential: &str, prompt: &str) -> Result<String, Failure> {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", credential)])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Failure::Timeout(format!(
                        "request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else {
                    Failure::Network(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Status {
                status: status.as_u16(),
                message: truncate(&body, 300),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| {
                Failure::Malformed(format!("failed to decode response: {}", e.without_url()))
            })?;

        body.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Failure::Malformed("response contained no candidate text".to_string()))
    }

    /// One logical attempt: rotate credentials and walk the model chain until
    /// a payload arrives or no option is left.
    async fn attempt(&self, prompt: &str) -> Result<String, ReasoningError> {
        let (mut index, mut credential) = self.pool.next_available();
        let mut model = self.model.clone();
        let mut tried_models: Vec<String> = Vec::new();
        let mut swaps_left = self.pool.len().saturating_sub(1);

        loop {
            match self.post(&model, &credential, prompt).await {
                Ok(text) => {
                    self.pool.mark_success(index);
                    if !tried_models.is_empty() {
                        tracing::info!(model = %model, "fallback model succeeded");
                    }
                    return Ok(text);
                }
                Err(Failure::Status { status: 404, .. }) => {
                    tried_models.push(model.clone());
                    match self.next_model(&model, &tried_models) {
                        Some(next) => {
                            metrics::counter!(crate::metrics::MODEL_FALLBACKS).increment(1);
                            tracing::warn!(
                                from = %model,
                                to = %next,
                                "model not found, trying fallback"
                            );
                            model = next;
                        }
                        None => {
                            return Err(ReasoningError::ModelUnavailable {
                                tried: tried_models,
                            })
                        }
                    }
                }
                Err(failure) => {
                    self.pool.mark_failure(index, failure.class());
                    if failure.swaps_credential() && swaps_left > 0 {
                        let (next_index, next_credential) = self.pool.next_available();
                        if next_index != index {
                            swaps_left -= 1;
                            metrics::counter!(crate::metrics::CREDENTIAL_SWAPS).increment(1);
                            tracing::warn!(
                                from = index,
                                to = next_index,
                                cause = %failure.label(),
                                "swapping credential"
                            );
                            index = next_index;
                            credential = next_credential;
                            continue;
                        }
                    }
                    return Err(failure.into_error());
                }
            }
        }
    }

    /// Outer retry loop around [`attempt`](Self::attempt) plus `parse`.
    async fn call<T>(
        &self,
        shape: &'static str,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T, ReasoningError>,
    ) -> Result<T, ReasoningError> {
        if self.log_prompts {
            tracing::debug!(shape, prompt, "reasoning prompt");
        }

        let max_attempts = self.retry.max_attempts().max(1);
        let call_start = Instant::now();
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            let result = match self.attempt(prompt).await {
                Ok(text) => parse(&text),
                Err(e) => Err(e),
            };
            let result = result.map_err(|e| e.map_messages(|m| self.pool.redact(m)));

            match result {
                Ok(value) => {
                    metrics::histogram!(crate::metrics::REASONING_DURATION, "shape" => shape)
                        .record(call_start.elapsed().as_secs_f64());
                    metrics::counter!(crate::metrics::REASONING_CALLS, "shape" => shape, "outcome" => "success")
                        .increment(1);
                    tracing::debug!(
                        shape,
                        attempt,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "reasoning call succeeded"
                    );
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt, e.is_rate_limited());
                    tracing::warn!(
                        shape,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "reasoning call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::histogram!(crate::metrics::REASONING_DURATION, "shape" => shape)
                        .record(call_start.elapsed().as_secs_f64());
                    metrics::counter!(crate::metrics::REASONING_CALLS, "shape" => shape, "outcome" => e.label())
                        .increment(1);
                    tracing::warn!(shape, attempts = attempt + 1, error = %e, "reasoning call failed");
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl ReasoningService for ResilientReasoningClient {
    async fn recommend(
        &self,
        site: &Site,
        context: &NetworkContext,
    ) -> Result<Recommendation, ReasoningError> {
        let prompt = prompt::single_prompt(site, context);
        self.call("single", &prompt, |text| parse::parse_single(&site.id, text))
            .await
    }

    async fn recommend_batch(
        &self,
        sites: &[Site],
        context: &NetworkContext,
    ) -> Result<Vec<Recommendation>, ReasoningError> {
        if sites.is_empty() {
            return Ok(Vec::new());
        }
        let prompt = prompt::batch_prompt(sites, context);
        let ids: Vec<&str> = sites.iter().map(|s| s.id.as_str()).collect();
        self.call("batch", &prompt, |text| parse::parse_batch(&ids, text))
            .await
    }
}

/// Outcome of one failed HTTP round trip, before classification.
#[derive(Debug)]
enum Failure {
    Status { status: u16, message: String },
    Timeout(String),
    Network(String),
    Malformed(String),
}

impl Failure {
    fn class(&self) -> FailureClass {
        match self {
            Failure::Status { status: 429, .. } => FailureClass::RateLimited,
            Failure::Status { status: 503, .. } => FailureClass::Unavailable,
            _ => FailureClass::Other,
        }
    }

    fn swaps_credential(&self) -> bool {
        matches!(
            self,
            Failure::Status {
                status: 429 | 503,
                ..
            } | Failure::Timeout(_)
        )
    }

    fn label(&self) -> String {
        match self {
            Failure::Status { status, .. } => status.to_string(),
            Failure::Timeout(_) => "timeout".to_string(),
            Failure::Network(_) => "network".to_string(),
            Failure::Malformed(_) => "malformed".to_string(),
        }
    }

    fn into_error(self) -> ReasoningError {
        match self {
            Failure::Status {
                status: 429,
                message,
            } => ReasoningError::TransientUpstream {
                kind: TransientKind::RateLimited,
                message,
            },
            Failure::Status {
                status: 503,
                message,
            } => ReasoningError::TransientUpstream {
                kind: TransientKind::Unavailable,
                message,
            },
            Failure::Status { status, message } => ReasoningError::Upstream { status, message },
            Failure::Timeout(message) => ReasoningError::TransientUpstream {
                kind: TransientKind::Timeout,
                message,
            },
            Failure::Network(message) => ReasoningError::TransientUpstream {
                kind: TransientKind::Network,
                message,
            },
            Failure::Malformed(message) => ReasoningError::MalformedResponse(message),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

/// generateContent request body
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GenerateContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerateContent {
    parts: Vec<GeneratePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeneratePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

/// generateContent response body
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GenerateCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerateCandidate {
    content: GenerateContent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::site::Action;

    fn config(base_url: String) -> ReasoningConfig {
        ReasoningConfig {
            base_url,
            model: "gemini-1.5-pro-latest".to_string(),
            fallback_models: vec!["gemini-2.0-flash".to_string()],
            retry: RetryConfig {
                max_attempts: 1,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                jitter_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn site() -> Site {
        Site {
            id: "SITE_001".to_string(),
            name: "General".to_string(),
            region: "NA".to_string(),
            demand: 100,
            inventory: 20,
            days_to_expiry: 15,
            urgency_score: 4.8,
            weekly_dispense_kits: 23.0,
            demand_variability: None,
        }
    }

    fn payload(text: &str) -> String {
        serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}]
        })
        .to_string()
    }

    const DECISION: &str = r#"{"structured_result":{"action":"resupply","quantity":90,"confidence":0.85,"reasons":["expiring"]},"draft_message":"Replace expiring stock."}"#;

    #[test]
    fn test_endpoint_does_not_repeat_models_segment() {
        let client =
            ResilientReasoningClient::new(config("http://x/v1beta/models".into()), vec!["k".into()])
                .unwrap();
        assert_eq!(
            client.endpoint("gemini-pro"),
            "http://x/v1beta/models/gemini-pro:generateContent"
        );
        let client =
            ResilientReasoningClient::new(config("http://x/v1beta/".into()), vec!["k".into()])
                .unwrap();
        assert_eq!(
            client.endpoint("gemini-pro"),
            "http://x/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn test_next_model_strips_latest_first() {
        let client =
            ResilientReasoningClient::new(config("http://x".into()), vec!["k".into()]).unwrap();
        let tried = vec!["gemini-1.5-pro-latest".to_string()];
        assert_eq!(
            client.next_model("gemini-1.5-pro-latest", &tried).as_deref(),
            Some("gemini-1.5-pro")
        );
        let tried = vec![
            "gemini-1.5-pro-latest".to_string(),
            "gemini-1.5-pro".to_string(),
        ];
        assert_eq!(
            client.next_model("gemini-1.5-pro", &tried).as_deref(),
            Some("gemini-2.0-flash")
        );
        let tried = vec!["gemini-2.0-flash".to_string()];
        assert_eq!(client.next_model("gemini-2.0-flash", &tried), None);
    }

    #[test]
    fn test_missing_credentials_fail_construction() {
        let result = ResilientReasoningClient::new(config("http://x".into()), vec![]);
        assert!(matches!(result, Err(ReasoningError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_recommend_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/models/gemini-1.5-pro-latest:generateContent")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "k1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(payload(DECISION))
            .create_async()
            .await;

        let client = ResilientReasoningClient::new(config(server.url()), vec!["k1".into()]).unwrap();
        let rec = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rec.result.action, Action::Resupply);
        assert_eq!(rec.result.quantity, 90);
        assert_eq!(rec.justification, "Replace expiring stock.");
    }

    #[tokio::test]
    async fn test_404_walks_fallback_chain() {
        let mut server = mockito::Server::new_async().await;
        let latest = server
            .mock("POST", "/models/gemini-1.5-pro-latest:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let stripped = server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let fallback = server
            .mock("POST", "/models/gemini-2.0-flash:generateContent")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(payload(DECISION))
            .create_async()
            .await;

        let client = ResilientReasoningClient::new(config(server.url()), vec!["k1".into()]).unwrap();
        let rec = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap();

        latest.assert_async().await;
        stripped.assert_async().await;
        fallback.assert_async().await;
        assert_eq!(rec.result.quantity, 90);
        assert_eq!(client.credential_status()[0].failure_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_fallback_is_model_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _any = server
            .mock("POST", mockito::Matcher::Any)
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .expect(3)
            .create_async()
            .await;

        let client = ResilientReasoningClient::new(config(server.url()), vec!["k1".into()]).unwrap();
        let err = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap_err();

        match err {
            ReasoningError::ModelUnavailable { tried } => assert_eq!(tried.len(), 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_is_redacted() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body("API key secret-cred-123 not valid")
            .create_async()
            .await;

        let client =
            ResilientReasoningClient::new(config(server.url()), vec!["secret-cred-123".into()])
                .unwrap();
        let err = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap_err();

        let text = err.to_string();
        assert!(!text.contains("secret-cred-123"));
        assert!(text.contains(REDACTED));
        assert!(matches!(err, ReasoningError::Upstream { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_network_error_hides_encoded_credential() {
        let mut cfg = config("http://127.0.0.1:1".into());
        cfg.retry.max_attempts = 1;
        let client = ResilientReasoningClient::new(cfg, vec!["sk+a/b=".into()]).unwrap();
        let err = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap_err();

        let text = err.to_string();
        assert!(matches!(
            err,
            ReasoningError::TransientUpstream {
                kind: TransientKind::Network,
                ..
            }
        ));
        assert!(!text.contains("sk+a/b="));
        assert!(!text.contains("sk%2Ba%2Fb%3D"));
    }

    #[tokio::test]
    async fn test_outer_retry_recovers_from_unparseable_payload() {
        let mut server = mockito::Server::new_async().await;
        let _bad = server
            .mock("POST", mockito::Matcher::Any)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(payload("not json at all"))
            .expect(1)
            .create_async()
            .await;
        let _good = server
            .mock("POST", mockito::Matcher::Any)
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(payload(DECISION))
            .create_async()
            .await;

        let mut cfg = config(server.url());
        cfg.retry.max_attempts = 2;
        let client = ResilientReasoningClient::new(cfg, vec!["k1".into()]).unwrap();
        let rec = client
            .recommend(&site(), &NetworkContext::default())
            .await
            .unwrap();
        assert_eq!(rec.result.quantity, 90);
    }
}
