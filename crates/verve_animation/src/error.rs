//! Error types for the animation runtime

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating [`crate::AnimationSettings`] or
/// a model configuration
///
/// Animating itself never fails: misuse is either a panic (wrong thread), a
/// debug assertion that degrades gracefully in release builds, or an invalid
/// model that is replaced by a default one with a warning.
#[derive(Error, Debug)]
pub enum AnimationError {
    #[error("Failed to read animation settings from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse animation settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid animation setting `{name}`: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Result type for animation configuration
pub type Result<T> = std::result::Result<T, AnimationError>;

pub(crate) fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(name, format!("must be a positive number, got {value}")))
    }
}

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> AnimationError {
    AnimationError::InvalidSetting {
        name,
        reason: reason.into(),
    }
}
