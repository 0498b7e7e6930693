//! # Scene Settings
//!
//! ```toml
//! pvs_max_distance = 10000.0
//! shadow_map_size = 128
//! lod_falloff = 5.0
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};

/// Tunables for culling, LOD selection and shadow bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSettings {
    /// Distance at which the coarsest LOD is selected.
    pub pvs_max_distance: f32,
    /// Shadow map size assigned to a light the first time it is updated.
    pub shadow_map_size: u32,
    /// LOD curve root: the requested level is `(d / max)^(1 / falloff) * max_lod`.
    pub lod_falloff: f32,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            pvs_max_distance: 10_000.0,
            shadow_map_size: 128,
            lod_falloff: 5.0,
        }
    }
}

impl SceneSettings {
    /// Parses settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidSettings`] on malformed TOML or invalid values.
    pub fn from_toml_str(source: &str) -> SceneResult<Self> {
        let settings: Self =
            toml::from_str(source).map_err(|e| SceneError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidSettings`] for non-positive distances or
    /// falloff, or a shadow map size that is not a power of two.
    pub fn validate(&self) -> SceneResult<()> {
        if !(self.pvs_max_distance > 0.0) {
            return Err(SceneError::InvalidSettings(
                "pvs_max_distance must be positive".into(),
            ));
        }
        if !(self.lod_falloff > 0.0) {
            return Err(SceneError::InvalidSettings("lod_falloff must be positive".into()));
        }
        if !self.shadow_map_size.is_power_of_two() {
            return Err(SceneError::InvalidSettings(format!(
                "shadow_map_size {} is not a power of two",
                self.shadow_map_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(SceneSettings::default().validate().is_ok());
    }

    #[test]
    fn test_parse_and_validate() {
        let settings = SceneSettings::from_toml_str("shadow_map_size = 256").unwrap();
        assert_eq!(settings.shadow_map_size, 256);
        assert!((settings.lod_falloff - 5.0).abs() < f32::EPSILON);

        assert!(SceneSettings::from_toml_str("shadow_map_size = 100").is_err());
        assert!(SceneSettings::from_toml_str("pvs_max_distance = -1.0").is_err());
    }
}
