//! Runtime settings
//!
//! Tolerances and global knobs for the animation runtime, loadable from TOML:
//!
//! ```toml
//! position_epsilon = 0.001
//! velocity_epsilon = 0.01
//! slowdown = 4.0
//! collection_padding = "repeat-last"
//!
//! [default_spring]
//! stiffness = 300.0
//! damping = 24.0
//!
//! [frame_rate]
//! min = 60.0
//! max = 120.0
//! preferred = 120.0
//! ```

use crate::clock::FrameRateRange;
use crate::error::{invalid, positive, AnimationError, Result};
use crate::spring::SpringConfig;
use crate::values::CollectionPadding;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Animation runtime settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSettings {
    /// Springs settle once every component is this close to the target
    pub position_epsilon: f64,

    /// ...and moving slower than this
    pub velocity_epsilon: f64,

    /// Decay animations stop once velocity drops below this
    pub decay_velocity_epsilon: f64,

    /// Upper bound on the time step of a single tick, in seconds
    pub max_frame_delta: f64,

    /// Divides every time step; values above 1 slow all animations down
    pub slowdown: f64,

    /// How collection-valued animations reconcile differing lengths
    pub collection_padding: CollectionPadding,

    /// Spring used by `animate()` when no model is chosen
    pub default_spring: SpringConfig,

    /// Refresh range requested from the frame clock
    pub frame_rate: FrameRateRange,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self {
            position_epsilon: 0.001,
            velocity_epsilon: 0.01,
            decay_velocity_epsilon: 0.01,
            max_frame_delta: 0.1,
            slowdown: 1.0,
            collection_padding: CollectionPadding::default(),
            default_spring: SpringConfig::default(),
            frame_rate: FrameRateRange::default(),
        }
    }
}

impl AnimationSettings {
    /// Parse and validate settings from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: AnimationSettings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| AnimationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&source)?;
        tracing::debug!("loaded animation settings from {}", path.display());
        Ok(settings)
    }

    /// Check every value is usable
    pub fn validate(&self) -> Result<()> {
        positive("position_epsilon", self.position_epsilon)?;
        positive("velocity_epsilon", self.velocity_epsilon)?;
        positive("decay_velocity_epsilon", self.decay_velocity_epsilon)?;
        positive("max_frame_delta", self.max_frame_delta)?;
        positive("slowdown", self.slowdown)?;
        self.default_spring.validate()?;
        if !self.frame_rate.is_valid() {
            return Err(invalid(
                "frame_rate",
                "expected 0 < min <= preferred <= max",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AnimationSettings::default().validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let settings = AnimationSettings::from_toml_str(
            r#"
            slowdown = 4.0
            collection_padding = "repeat-last"

            [default_spring]
            stiffness = 300.0
            damping = 24.0
            "#,
        )
        .unwrap();

        assert_eq!(settings.slowdown, 4.0);
        assert_eq!(settings.collection_padding, CollectionPadding::RepeatLast);
        assert_eq!(settings.default_spring.stiffness, 300.0);
        assert_eq!(settings.default_spring.mass, 1.0);
        assert_eq!(settings.position_epsilon, 0.001);
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let err = AnimationSettings::from_toml_str("slowdown = 0.0").unwrap_err();
        assert!(matches!(
            err,
            AnimationError::InvalidSetting {
                name: "slowdown",
                ..
            }
        ));
    }

    #[test]
    fn test_spring_damping_must_be_a_number() {
        for damping in ["nan", "-1.0"] {
            let document = format!("[default_spring]\ndamping = {damping}");
            let err = AnimationSettings::from_toml_str(&document).unwrap_err();
            assert!(matches!(
                err,
                AnimationError::InvalidSetting {
                    name: "spring.damping",
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        let err = AnimationSettings::from_toml_str("slowdown = \"fast\"").unwrap_err();
        assert!(matches!(err, AnimationError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = AnimationSettings::load("/nonexistent/verve-animation.toml").unwrap_err();
        assert!(matches!(err, AnimationError::Io { .. }));
        assert!(err.to_string().contains("verve-animation.toml"));
    }
}
