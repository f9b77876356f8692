//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document is a valid config.
//!
//! ```yaml
//! activation_distance: 8.0
//! ordinal_step: 1.0
//! write_timeout_ms: 10000
//! queue_capacity: 256
//! ```

use crate::error::{BoardError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_ACTIVATION_DISTANCE: f64 = 8.0;
const DEFAULT_ORDINAL_STEP: f64 = 1.0;
const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Tunables for the drag controller, allocator and event loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pointer travel (in pixels) before a pressed card starts dragging
    pub activation_distance: f64,
    /// Distance between a new head/tail ordinal and its only neighbor
    pub ordinal_step: f64,
    /// Durable-write timeout; `None` waits indefinitely
    pub write_timeout_ms: Option<u64>,
    /// Bound of the event loop's message queue
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation_distance: DEFAULT_ACTIVATION_DISTANCE,
            ordinal_step: DEFAULT_ORDINAL_STEP,
            write_timeout_ms: Some(DEFAULT_WRITE_TIMEOUT_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| BoardError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "loaded engine config");
        Ok(config)
    }

    /// Set the drag activation distance
    pub fn with_activation_distance(mut self, distance: f64) -> Self {
        self.activation_distance = distance;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Write timeout as a `Duration`
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if !self.activation_distance.is_finite() || self.activation_distance < 0.0 {
            return Err(BoardError::config(
                "activation_distance",
                "must be a finite, non-negative number",
            ));
        }
        if !self.ordinal_step.is_finite() || self.ordinal_step <= 0.0 {
            return Err(BoardError::config(
                "ordinal_step",
                "must be a finite, positive number",
            ));
        }
        if self.write_timeout_ms == Some(0) {
            return Err(BoardError::config(
                "write_timeout_ms",
                "must be positive; use null to disable the timeout",
            ));
        }
        if self.queue_capacity == 0 {
            return Err(BoardError::config("queue_capacity", "must be at least 1"));
        }
        Ok(())
    }
}
