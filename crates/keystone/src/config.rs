//! # Engine Configuration
//!
//! One TOML file with a table per layer:
//!
//! ```toml
//! [core]
//! worker_threads = 4
//! scratch_bytes = 1048576
//!
//! [scene]
//! pvs_max_distance = 2000.0
//! shadow_map_size = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use keystone_core::CoreConfig;
use keystone_scene::SceneSettings;

use crate::error::{EngineError, EngineResult};

/// Settings for every engine layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker pool and scratch memory.
    pub core: CoreConfig,
    /// Culling, LOD and shadow tunables.
    pub scene: SceneSettings,
}

impl EngineConfig {
    /// Parses and validates a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] on malformed TOML, or the layer's
    /// own error when a value is out of range.
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the file cannot be read, and
    /// the errors of [`EngineConfig::from_toml_str`] otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Validates both layers.
    ///
    /// # Errors
    ///
    /// [`EngineError::Core`] or [`EngineError::Scene`] with the first bad value.
    pub fn validate(&self) -> EngineResult<()> {
        self.core.validate()?;
        self.scene.validate()?;
        Ok(())
    }
}
