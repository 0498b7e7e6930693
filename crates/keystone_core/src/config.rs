//! # Runtime Configuration
//!
//! Worker pool and scratch memory settings, loaded once at startup from TOML.
//!
//! ```toml
//! worker_threads = 0        # 0 = available parallelism minus one
//! scratch_bytes = 1048576   # per-worker scratch budget
//! idle_poll_us = 200
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Default per-worker scratch budget (1MB).
pub const DEFAULT_SCRATCH_BYTES: usize = 1024 * 1024;

/// Configuration for the worker pool and per-worker memory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Number of background worker threads. `0` picks a count from the host.
    pub worker_threads: usize,
    /// Scratch budget in bytes handed to every worker.
    pub scratch_bytes: usize,
    /// How long an idle worker blocks on the global queue before polling again.
    pub idle_poll_us: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            scratch_bytes: DEFAULT_SCRATCH_BYTES,
            idle_poll_us: 200,
        }
    }
}

impl CoreConfig {
    /// Parses a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] when the idle poll interval is zero.
    pub fn validate(&self) -> CoreResult<()> {
        if self.idle_poll_us == 0 {
            return Err(CoreError::InvalidConfig(
                "idle_poll_us must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Number of worker threads to spawn, resolving `0` against the host.
    #[must_use]
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map_or(1, |n| n.get().saturating_sub(1))
            .max(1)
    }

    /// Idle poll interval as a duration.
    #[inline]
    #[must_use]
    pub const fn idle_poll(&self) -> Duration {
        Duration::from_micros(self.idle_poll_us)
    }
}
