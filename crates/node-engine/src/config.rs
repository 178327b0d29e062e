//! Engine configuration
//!
//! Loaded from JSON (camelCase keys, every field optional) and/or the
//! process environment:
//!
//! | Variable                            | Field                |
//! |-------------------------------------|----------------------|
//! | `NODE_ENGINE_UNDO_CAPACITY`         | `undoCapacity`       |
//! | `NODE_ENGINE_COMPRESSION_LEVEL`     | `compressionLevel`   |
//! | `NODE_ENGINE_MAX_CONCURRENT_NODES`  | `maxConcurrentNodes` |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NodeEngineError, Result};
use crate::undo::DEFAULT_COMPRESSION_LEVEL;

pub const ENV_UNDO_CAPACITY: &str = "NODE_ENGINE_UNDO_CAPACITY";
pub const ENV_COMPRESSION_LEVEL: &str = "NODE_ENGINE_COMPRESSION_LEVEL";
pub const ENV_MAX_CONCURRENT_NODES: &str = "NODE_ENGINE_MAX_CONCURRENT_NODES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Snapshots kept by each session's undo stack (at least 1)
    pub undo_capacity: usize,
    /// zstd level for undo snapshots
    pub compression_level: i32,
    /// Upper bound on nodes of one level running at once; `None` leaves
    /// it to the runtime
    pub max_concurrent_nodes: Option<usize>,
    /// Idle time after which the execution manager drops a session
    pub session_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_capacity: 100,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_concurrent_nodes: None,
            session_timeout_secs: 3600,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Defaults overridden by any `NODE_ENGINE_*` variables that are set
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (the environment, in `from_env`)
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_UNDO_CAPACITY) {
            self.undo_capacity = parse_var(ENV_UNDO_CAPACITY, &value)?;
        }
        if let Some(value) = lookup(ENV_COMPRESSION_LEVEL) {
            self.compression_level = parse_var(ENV_COMPRESSION_LEVEL, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT_NODES) {
            self.max_concurrent_nodes = match value.trim() {
                "" | "none" | "0" => None,
                v => Some(parse_var(ENV_MAX_CONCURRENT_NODES, v)?),
            };
        }
        Ok(self.normalized())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    fn normalized(mut self) -> Self {
        self.undo_capacity = self.undo_capacity.max(1);
        self.max_concurrent_nodes = self.max_concurrent_nodes.filter(|n| *n > 0);
        self
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NodeEngineError::Serialization(format!("invalid value '{}' for {}", value, key)))
}
