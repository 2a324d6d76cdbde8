//! Momentum decay
//!
//! Exponential velocity decay, the model behind flick-to-scroll. The rate is
//! expressed per millisecond: each millisecond the velocity is multiplied by
//! `deceleration_rate`. Integrating that gives a closed form for both
//! position and velocity after any elapsed time, and a finite resting
//! position for every starting velocity.

use crate::error::{invalid, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a decay animation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Fraction of velocity kept per millisecond, in `(0, 1)`
    pub deceleration_rate: f64,
}

impl DecayConfig {
    /// Standard scroll deceleration
    pub const NORMAL: DecayConfig = DecayConfig {
        deceleration_rate: 0.998,
    };

    /// Quick deceleration, used for paging
    pub const FAST: DecayConfig = DecayConfig {
        deceleration_rate: 0.99,
    };

    pub fn new(deceleration_rate: f64) -> Self {
        debug_assert!(
            deceleration_rate > 0.0 && deceleration_rate < 1.0,
            "deceleration rate must be in (0, 1)"
        );
        Self {
            deceleration_rate: deceleration_rate.clamp(f64::EPSILON, 1.0 - f64::EPSILON),
        }
    }

    /// `1000 · ln(rate)`: the (negative) continuous decay coefficient per second
    pub fn coefficient(&self) -> f64 {
        1000.0 * self.deceleration_rate.ln()
    }

    /// Position and velocity change over `dt` seconds
    ///
    /// Returns `(displacement, new_velocity)`.
    pub fn advance(&self, velocity: f64, dt: f64) -> (f64, f64) {
        let coeff = self.coefficient();
        let factor = (coeff * dt).exp();
        ((factor - 1.0) / coeff * velocity, velocity * factor)
    }

    /// How far a value moving at `velocity` travels before it stops
    pub fn resting_displacement(&self, velocity: f64) -> f64 {
        -velocity / self.coefficient()
    }

    /// Initial velocity that comes to rest exactly `displacement` away
    pub fn velocity_to_travel(&self, displacement: f64) -> f64 {
        -displacement * self.coefficient()
    }

    /// Seconds until `|velocity|` decays below `threshold`
    pub fn duration(&self, velocity: f64, threshold: f64) -> f64 {
        let speed = velocity.abs();
        let threshold = threshold.max(f64::EPSILON);
        if speed <= threshold {
            return 0.0;
        }
        (threshold / speed).ln() / self.coefficient()
    }

    /// Check the rate lies strictly between 0 and 1
    pub fn validate(&self) -> Result<()> {
        let rate = self.deceleration_rate;
        if rate.is_finite() && rate > 0.0 && rate < 1.0 {
            Ok(())
        } else {
            Err(invalid(
                "decay.deceleration_rate",
                format!("must be in (0, 1), got {rate}"),
            ))
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self::NORMAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decay_is_monotonic_and_bounded() {
        let config = DecayConfig::NORMAL;
        let (mut position, mut velocity) = (0.0, 500.0);
        let mut previous = position;
        for _ in 0..600 {
            let (dx, v) = config.advance(velocity, 1.0 / 60.0);
            position += dx;
            velocity = v;
            assert!(position.is_finite());
            assert!(position >= previous);
            previous = position;
        }
        let rest = config.resting_displacement(500.0);
        assert!(position <= rest + 1e-9);
        assert!((position - rest).abs() < 1.0);
    }

    #[test]
    fn test_resting_displacement_matches_integration() {
        let config = DecayConfig::FAST;
        let (dx, v) = config.advance(800.0, 10.0);
        assert!(v.abs() < 1e-9);
        assert!((dx - config.resting_displacement(800.0)).abs() < 1e-6);
    }

    #[test]
    fn test_velocity_to_travel_inverts_rest() {
        let config = DecayConfig::NORMAL;
        let velocity = config.velocity_to_travel(-120.0);
        assert!(velocity < 0.0);
        assert!((config.resting_displacement(velocity) + 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_reaches_threshold() {
        let config = DecayConfig::NORMAL;
        let t = config.duration(500.0, 0.01);
        let (_, v) = config.advance(500.0, t);
        assert!((v - 0.01).abs() < 1e-9);
        assert_eq!(config.duration(0.001, 0.01), 0.0);
    }

    #[test]
    fn test_advance_composes() {
        let config = DecayConfig::NORMAL;
        let (dx1, v1) = config.advance(300.0, 0.05);
        let (dx2, v2) = config.advance(v1, 0.05);
        let (dx, v) = config.advance(300.0, 0.1);
        assert!((dx1 + dx2 - dx).abs() < 1e-9);
        assert!((v2 - v).abs() < 1e-9);
    }
}
