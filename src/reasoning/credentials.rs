//! Credential rotation state.
//!
//! One pool per client. Every in-flight call may mark failures, so the state
//! sits behind a mutex; the lock is never held across an await point.

use super::error::ReasoningError;
use crate::config::CooldownConfig;
use serde::Serialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Placeholder substituted for credential values in any outgoing text.
pub const REDACTED: &str = "***REDACTED***";

/// Failure class that decides how long a credential sits out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    RateLimited,
    Unavailable,
    Other,
}

#[derive(Debug)]
struct Credential {
    value: String,
    failure_count: u32,
    cooldown_until: Option<Instant>,
}

impl Credential {
    fn is_available(&self, now: Instant) -> bool {
        self.cooldown_until.map_or(true, |until| now >= until)
    }
}

#[derive(Debug)]
struct PoolState {
    credentials: Vec<Credential>,
    cursor: usize,
}

/// Point-in-time view of one credential, safe to log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialStatus {
    pub index: usize,
    pub failure_count: u32,
    pub cooldown_remaining: Duration,
}

/// Round-robin credential pool with per-credential cooldowns.
#[derive(Debug)]
pub struct CredentialPool {
    state: Mutex<PoolState>,
    cooldown: CooldownConfig,
}

impl CredentialPool {
    /// Build a pool. An empty set is a configuration error.
    pub fn new(values: Vec<String>, cooldown: CooldownConfig) -> Result<Self, ReasoningError> {
        if values.is_empty() {
            return Err(ReasoningError::Configuration(
                "no reasoning credentials configured".to_string(),
            ));
        }
        let credentials = values
            .into_iter()
            .map(|value| Credential {
                value,
                failure_count: 0,
                cooldown_until: None,
            })
            .collect();
        Ok(Self {
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
            }),
            cooldown,
        })
    }

    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Next credential whose cooldown has elapsed, round-robin.
    ///
    /// When every credential is cooling down all cooldowns are cleared and
    /// rotation continues, so a caller always gets a credential.
    pub fn next_available(&self) -> (usize, String) {
        let mut state = self.lock();
        let now = Instant::now();
        let len = state.credentials.len();
        let start = state.cursor % len;

        let found = (0..len)
            .map(|offset| (start + offset) % len)
            .find(|&i| state.credentials[i].is_available(now));

        let index = match found {
            Some(index) => index,
            None => {
                tracing::warn!(
                    credentials = len,
                    "all credentials cooling down, resetting cooldowns"
                );
                for credential in &mut state.credentials {
                    credential.cooldown_until = None;
                }
                start
            }
        };

        state.cursor = (index + 1) % len;
        (index, state.credentials[index].value.clone())
    }

    /// Put a credential into cooldown for the given failure class.
    pub fn mark_failure(&self, index: usize, class: FailureClass) {
        let seconds = match class {
            FailureClass::RateLimited => self.cooldown.rate_limited_seconds,
            FailureClass::Unavailable => self.cooldown.unavailable_seconds,
            FailureClass::Other => self.cooldown.other_seconds,
        };
        let mut state = self.lock();
        if let Some(credential) = state.credentials.get_mut(index) {
            credential.failure_count += 1;
            credential.cooldown_until = Some(Instant::now() + Duration::from_secs(seconds));
            tracing::debug!(
                credential = index,
                failures = credential.failure_count,
                cooldown_seconds = seconds,
                "credential cooling down"
            );
        }
    }

    pub fn mark_success(&self, index: usize) {
        let mut state = self.lock();
        if let Some(credential) = state.credentials.get_mut(index) {
            credential.failure_count = 0;
        }
    }

    /// Replace every credential value in `text`, both literal and in its
    /// query-string encoding.
    pub fn redact(&self, text: &str) -> String {
        let state = self.lock();
        state
            .credentials
            .iter()
            .filter(|c| !c.value.is_empty())
            .fold(text.to_string(), |acc, c| {
                let encoded = form_encode(&c.value);
                let acc = acc.replace(&c.value, REDACTED);
                if encoded == c.value {
                    acc
                } else {
                    acc.replace(&encoded, REDACTED)
                }
            })
    }

    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        let state = self.lock();
        let now = Instant::now();
        state
            .credentials
            .iter()
            .enumerate()
            .map(|(index, c)| CredentialStatus {
                index,
                failure_count: c.failure_count,
                cooldown_remaining: c
                    .cooldown_until
                    .map(|until| until.saturating_duration_since(now))
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// `application/x-www-form-urlencoded` spelling of `value`, as reqwest
/// writes it into a query string.
fn form_encode(value: &str) -> String {
    value.bytes().fold(String::with_capacity(value.len()), |mut out, b| {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'*' | b'-' | b'.' | b'_' => {
                out.push(char::from(b))
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
        out
    })
}
