//! Dispatch (batching and concurrency) configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How reasoning-lane work is put on the wire.
///
/// # Example
///
/// ```toml
/// [dispatch]
/// batch_enabled = true
/// batch_size = 5
/// inter_batch_delay_ms = 3000
/// parallel = true
/// max_concurrent = 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Send reasoning-lane sites in multi-site calls.
    pub batch_enabled: bool,
    /// Sites per batched call. A size of 1 means individual calls.
    pub batch_size: usize,
    /// Pause between consecutive batched calls.
    pub inter_batch_delay_ms: u64,
    /// Fan individual calls out over a bounded pool.
    pub parallel: bool,
    /// In-flight ceiling for individual reasoning calls.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_enabled: true,
            batch_size: 5,
            inter_batch_delay_ms: 3000,
            parallel: true,
            max_concurrent: 3,
        }
    }
}

impl DispatchConfig {
    /// Batched dispatch is used only when enabled with a size above one.
    pub fn uses_batches(&self) -> bool {
        self.batch_enabled && self.batch_size > 1
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    /// Pool size for individual reasoning calls.
    pub fn reasoning_pool(&self) -> usize {
        if self.parallel {
            self.max_concurrent.max(1)
        } else {
            1
        }
    }

    /// Pool size for the rule lane, roughly twice the reasoning pool.
    pub fn rule_pool(&self) -> usize {
        if self.parallel {
            self.max_concurrent.max(1) * 2
        } else {
            1
        }
    }
}
