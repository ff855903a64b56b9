//! Response payload parsing.
//!
//! The endpoint returns free text that should be JSON. Anything that is not
//! JSON at all is a [`ReasoningError::MalformedResponse`]; JSON that lacks the
//! expected structure is [`ParsedResponse::Malformed`] and is patched into a
//! conservative recommendation.

use super::error::ReasoningError;
use crate::site::{Action, Decision, DecisionSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MISSING_RESULT_REASON: &str = "Unable to parse structured result";
pub const MISSING_DRAFT: &str = "Unable to generate justification message.";
pub const PATCHED_CONFIDENCE: f64 = 0.5;
pub const MISSING_SITE_CONFIDENCE: f64 = 0.3;

/// The structured part of a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredResult {
    pub action: Action,
    pub quantity: u32,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl StructuredResult {
    fn conservative(confidence: f64, reason: String) -> Self {
        Self {
            action: Action::NoResupply,
            quantity: 0,
            confidence,
            reasons: vec![reason],
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResult {
    action: Action,
    #[serde(default)]
    quantity: f64,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    reasons: Vec<String>,
}

fn default_confidence() -> f64 {
    PATCHED_CONFIDENCE
}

impl From<RawResult> for StructuredResult {
    fn from(raw: RawResult) -> Self {
        let quantity = if raw.quantity.is_finite() && raw.quantity > 0.0 {
            raw.quantity.min(f64::from(u32::MAX)) as u32
        } else {
            0
        };
        Self {
            action: raw.action,
            quantity,
            confidence: raw.confidence,
            reasons: raw.reasons,
        }
    }
}

/// One parsed recommendation payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    WellFormed {
        result: StructuredResult,
        justification: String,
    },
    Malformed {
        raw: String,
        reason: String,
    },
}

impl ParsedResponse {
    /// Interpret one JSON object carrying `structured_result` and `draft_message`.
    pub fn from_value(value: &Value) -> Self {
        let justification = value
            .get("draft_message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| MISSING_DRAFT.to_string());

        match value.get("structured_result") {
            None => ParsedResponse::Malformed {
                raw: value.to_string(),
                reason: "missing structured_result".to_string(),
            },
            Some(structured) => match RawResult::deserialize(structured) {
                Ok(raw) => ParsedResponse::WellFormed {
                    result: raw.into(),
                    justification,
                },
                Err(e) => ParsedResponse::Malformed {
                    raw: structured.to_string(),
                    reason: e.to_string(),
                },
            },
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, ParsedResponse::Malformed { .. })
    }
}

/// A recommendation for one site, ready to become a [`Decision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub site_id: String,
    pub result: StructuredResult,
    pub justification: String,
    /// True when the payload had to be replaced by a conservative default.
    pub patched: bool,
}

impl Recommendation {
    pub fn from_parsed(site_id: &str, parsed: ParsedResponse) -> Self {
        match parsed {
            ParsedResponse::WellFormed {
                result,
                justification,
            } => Self {
                site_id: site_id.to_string(),
                result,
                justification,
                patched: false,
            },
            ParsedResponse::Malformed { raw, reason } => {
                tracing::warn!(
                    site_id,
                    %reason,
                    raw_len = raw.len(),
                    "patching malformed recommendation"
                );
                Self {
                    site_id: site_id.to_string(),
                    result: StructuredResult::conservative(
                        PATCHED_CONFIDENCE,
                        MISSING_RESULT_REASON.to_string(),
                    ),
                    justification: MISSING_DRAFT.to_string(),
                    patched: true,
                }
            }
        }
    }

    /// Stand-in for a site the batch response did not mention.
    pub fn missing(site_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            result: StructuredResult::conservative(
                MISSING_SITE_CONFIDENCE,
                format!("Site {} not found in batch response", site_id),
            ),
            justification: MISSING_DRAFT.to_string(),
            patched: true,
        }
    }

    /// Normalise into a decision: confidence clamped to `[0, 1]`, no quantity
    /// on `no_resupply`, and at least the minimum order on `resupply`.
    pub fn into_decision(self, min_order_quantity: u32, latency_ms: f64) -> Decision {
        let confidence = if self.result.confidence.is_nan() {
            0.0
        } else {
            self.result.confidence.clamp(0.0, 1.0)
        };
        let quantity = match self.result.action {
            Action::NoResupply => 0,
            Action::Resupply => self.result.quantity.max(min_order_quantity),
        };
        Decision {
            site_id: self.site_id,
            action: self.result.action,
            quantity,
            confidence,
            reason: self.justification,
            reasons: self.result.reasons,
            source: DecisionSource::Reasoning,
            degraded: false,
            latency_ms,
        }
    }
}

fn parse_json(text: &str) -> Result<Value, ReasoningError> {
    let trimmed = strip_code_fence(text.trim());
    serde_json::from_str(trimmed)
        .map_err(|e| ReasoningError::MalformedResponse(format!("payload is not JSON: {}", e)))
}

/// Some models wrap JSON in a Markdown fence even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(text)
}

/// Parse a single-site payload.
pub fn parse_single(site_id: &str, text: &str) -> Result<Recommendation, ReasoningError> {
    let value = parse_json(text)?;
    if !value.is_object() {
        return Err(ReasoningError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    }
    Ok(Recommendation::from_parsed(
        site_id,
        ParsedResponse::from_value(&value),
    ))
}

/// Parse a batch payload and match items to `site_ids` by echoed id.
///
/// The result has one entry per requested id, in request order.
pub fn parse_batch(site_ids: &[&str], text: &str) -> Result<Vec<Recommendation>, ReasoningError> {
    let value = parse_json(text)?;
    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("sites") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ReasoningError::MalformedResponse(
                    "batch response has no sites array".to_string(),
                ))
            }
        },
        _ => {
            return Err(ReasoningError::MalformedResponse(
                "batch response is neither an array nor an object".to_string(),
            ))
        }
    };

    Ok(site_ids
        .iter()
        .map(|&id| {
            items
                .iter()
                .find(|item| item.get("site_id").and_then(Value::as_str) == Some(id))
                .map(|item| Recommendation::from_parsed(id, ParsedResponse::from_value(item)))
                .unwrap_or_else(|| {
                    tracing::warn!(site_id = id, "site missing from batch response");
                    Recommendation::missing(id)
                })
        })
        .collect())
}
