//! Error types for reasoning calls.

use std::fmt;
use thiserror::Error;

/// Upstream condition that is expected to clear on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// HTTP 429
    RateLimited,
    /// HTTP 503
    Unavailable,
    /// Request exceeded the configured deadline
    Timeout,
    /// Connection refused, DNS failure, reset
    Network,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransientKind::RateLimited => "rate limited",
            TransientKind::Unavailable => "service unavailable",
            TransientKind::Timeout => "timeout",
            TransientKind::Network => "network error",
        };
        f.write_str(label)
    }
}

/// Errors that can occur while consulting the reasoning endpoint.
///
/// Messages never contain literal credential values; the client redacts them
/// before an error leaves it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReasoningError {
    /// 429, 503, timeout or connection failure after every credential swap.
    #[error("Transient upstream failure ({kind}): {message}")]
    TransientUpstream { kind: TransientKind, message: String },

    /// Every model in the fallback chain returned 404.
    #[error("No reasoning model available (tried: {})", tried.join(", "))]
    ModelUnavailable { tried: Vec<String> },

    /// Any other non-success status.
    #[error("Upstream error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Payload could not be interpreted at all.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No usable credentials or client construction failed.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ReasoningError {
    /// Whether the outer retry loop should try the logical call again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ReasoningError::Configuration(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            ReasoningError::TransientUpstream {
                kind: TransientKind::RateLimited,
                ..
            }
        )
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ReasoningError::TransientUpstream { .. } => "transient",
            ReasoningError::ModelUnavailable { .. } => "model_unavailable",
            ReasoningError::Upstream { .. } => "upstream",
            ReasoningError::MalformedResponse(_) => "malformed",
            ReasoningError::Configuration(_) => "configuration",
        }
    }

    /// Rewrite every free-text message with `f`.
    pub(crate) fn map_messages(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            ReasoningError::TransientUpstream { kind, message } => {
                ReasoningError::TransientUpstream {
                    kind,
                    message: f(&message),
                }
            }
            ReasoningError::ModelUnavailable { tried } => ReasoningError::ModelUnavailable {
                tried: tried.iter().map(|m| f(m)).collect(),
            },
            ReasoningError::Upstream { status, message } => ReasoningError::Upstream {
                status,
                message: f(&message),
            },
            ReasoningError::MalformedResponse(message) => {
                ReasoningError::MalformedResponse(f(&message))
            }
            ReasoningError::Configuration(message) => ReasoningError::Configuration(f(&message)),
        }
    }
}
