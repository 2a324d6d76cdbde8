//! Spring physics animation
//!
//! Damped harmonic oscillator solved in closed form. Given the displacement
//! from the target and the current velocity, [`SpringConfig::advance`] returns
//! the exact state after `dt` seconds, so results do not depend on frame rate
//! and large frame gaps never destabilise the simulation.
//!
//! Springs can be described physically (stiffness, damping, mass) or
//! perceptually (response + damping ratio, or duration + bounce).

use crate::error::{invalid, positive, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Damping ratios this close to 1 use the critically damped solution
const CRITICAL_TOLERANCE: f64 = 1e-6;

/// Iteration cap for the critically damped settling estimate
const SETTLING_MAX_ITERATIONS: usize = 100;

/// Configuration for a spring animation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpringConfig {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl SpringConfig {
    /// Create a new spring configuration
    pub fn new(stiffness: f64, damping: f64, mass: f64) -> Self {
        Self {
            stiffness,
            damping,
            mass,
        }
    }

    /// Spring from its perceptual parameters
    ///
    /// `response` is the period of the undamped oscillation in seconds and
    /// `damping_ratio` is 1 for critical damping, below 1 to bounce.
    pub fn from_response(response: f64, damping_ratio: f64, mass: f64) -> Self {
        debug_assert!(response > 0.0, "spring response must be positive");
        let response = response.max(f64::EPSILON);
        let omega = TAU / response;
        Self {
            stiffness: mass * omega * omega,
            damping: 2.0 * TAU * damping_ratio * mass / response,
            mass,
        }
    }

    /// Spring from a perceived duration and a bounce in `(-1, 1)`
    ///
    /// Positive bounce overshoots, zero is critically damped and negative
    /// bounce is overdamped.
    pub fn from_duration_bounce(duration: f64, bounce: f64) -> Self {
        let bounce = bounce.clamp(-0.999, 0.999);
        let damping_ratio = if bounce >= 0.0 {
            1.0 - bounce
        } else {
            1.0 / (1.0 + bounce)
        };
        Self::from_response(duration, damping_ratio, 1.0)
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0)
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self::new(400.0, 30.0, 1.0)
    }

    /// A very stiff spring with minimal oscillation (good for quick responses)
    pub fn snappy() -> Self {
        Self::new(600.0, 40.0, 1.0)
    }

    /// A slow spring with no overshoot (critically damped)
    pub fn molasses() -> Self {
        Self::new(100.0, 20.0, 1.0)
    }

    /// Half-second critically damped spring
    pub fn smooth() -> Self {
        Self::from_duration_bounce(0.5, 0.0)
    }

    /// Half-second spring with a visible bounce
    pub fn bouncy() -> Self {
        Self::from_duration_bounce(0.5, 0.3)
    }

    /// Calculate critical damping for this spring's stiffness and mass
    pub fn critical_damping(&self) -> f64 {
        2.0 * (self.stiffness * self.mass).sqrt()
    }

    pub fn damping_ratio(&self) -> f64 {
        self.damping / self.critical_damping()
    }

    /// Period of the undamped oscillation in seconds
    pub fn response(&self) -> f64 {
        TAU * (self.mass / self.stiffness).sqrt()
    }

    /// Inverse of the bounce mapping used by [`SpringConfig::from_duration_bounce`]
    pub fn bounce(&self) -> f64 {
        let ratio = self.damping_ratio();
        if ratio <= 1.0 {
            1.0 - ratio
        } else {
            1.0 / ratio - 1.0
        }
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        self.damping_ratio() < 1.0 - CRITICAL_TOLERANCE
    }

    /// Check if the spring is critically damped (no oscillation, fastest settling)
    pub fn is_critically_damped(&self) -> bool {
        (self.damping_ratio() - 1.0).abs() < CRITICAL_TOLERANCE
    }

    /// Check if the spring is overdamped (slow settling, no oscillation)
    pub fn is_overdamped(&self) -> bool {
        self.damping_ratio() > 1.0 + CRITICAL_TOLERANCE
    }

    fn decay_rate(&self) -> f64 {
        self.damping / (2.0 * self.mass)
    }

    fn natural_frequency(&self) -> f64 {
        (self.stiffness / self.mass).sqrt()
    }

    /// Exact state after `dt` seconds
    ///
    /// `displacement` is measured from the target; the returned pair is the
    /// new displacement and velocity.
    pub fn advance(&self, displacement: f64, velocity: f64, dt: f64) -> (f64, f64) {
        let beta = self.decay_rate();
        let omega0 = self.natural_frequency();
        let a = displacement;
        let envelope = (-beta * dt).exp();

        if self.is_critically_damped() {
            let c = velocity + beta * a;
            let x = envelope * (a + c * dt);
            let v = envelope * (velocity - beta * c * dt);
            (x, v)
        } else if self.is_underdamped() {
            let omega_d = omega0 * (1.0 - self.damping_ratio().powi(2)).sqrt();
            let b = (velocity + beta * a) / omega_d;
            let (sin, cos) = (omega_d * dt).sin_cos();
            let x = envelope * (a * cos + b * sin);
            let v = envelope * ((b * omega_d - beta * a) * cos - (a * omega_d + beta * b) * sin);
            (x, v)
        } else {
            let omega2 = omega0 * (self.damping_ratio().powi(2) - 1.0).sqrt();
            let b = (velocity + beta * a) / omega2;
            let (sinh, cosh) = ((omega2 * dt).sinh(), (omega2 * dt).cosh());
            let x = envelope * (a * cosh + b * sinh);
            let v = envelope * ((b * omega2 - beta * a) * cosh + (a * omega2 - beta * b) * sinh);
            (x, v)
        }
    }

    /// Estimated seconds until the displacement stays within `epsilon`
    ///
    /// Uses the decaying envelope of the analytical solution, so the estimate
    /// errs on the long side for oscillating springs.
    pub fn settling_duration(&self, displacement: f64, velocity: f64, epsilon: f64) -> f64 {
        let epsilon = epsilon.max(f64::EPSILON);
        let beta = self.decay_rate();
        let omega0 = self.natural_frequency();
        let a = displacement;

        if a.abs() < epsilon && velocity.abs() < epsilon {
            return 0.0;
        }
        if beta <= 0.0 {
            return f64::INFINITY;
        }

        if self.is_critically_damped() {
            let c = velocity + beta * a;
            let (a, c) = (a.abs(), c.abs());
            // Newton iteration on h(t) = ln(|A| + |C| t) - βt - ln ε
            let h = |t: f64| (a + c * t).ln() - beta * t - epsilon.ln();
            let dh = |t: f64| c / (a + c * t) - beta;

            let mut t = ((a + c / beta).max(epsilon) / epsilon).ln() / beta;
            for _ in 0..SETTLING_MAX_ITERATIONS {
                let slope = dh(t);
                if slope.abs() < f64::EPSILON {
                    break;
                }
                let next = (t - h(t) / slope).max(0.0);
                if (next - t).abs() < 1e-6 {
                    t = next;
                    break;
                }
                t = next;
            }
            t.max(0.0)
        } else if self.is_underdamped() {
            let omega_d = omega0 * (1.0 - self.damping_ratio().powi(2)).sqrt();
            let b = (velocity + beta * a) / omega_d;
            let amplitude = a.abs() + b.abs();
            ((amplitude / epsilon).ln() / beta).max(0.0)
        } else {
            let omega2 = omega0 * (self.damping_ratio().powi(2) - 1.0).sqrt();
            let b = (velocity + beta * a) / omega2;
            let amplitude = a.abs() + b.abs();
            ((amplitude / epsilon).ln() / (beta - omega2)).max(0.0)
        }
    }

    /// Check the parameters describe a spring that settles
    pub fn validate(&self) -> Result<()> {
        positive("spring.stiffness", self.stiffness)?;
        positive("spring.mass", self.mass)?;
        if !(self.damping.is_finite() && self.damping >= 0.0) {
            return Err(invalid(
                "spring.damping",
                format!("must be a non-negative number, got {}", self.damping),
            ));
        }
        Ok(())
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::stiff()
    }
}
