//! Easing curves
//!
//! Maps linear progress `t ∈ [0, 1]` to eased progress. The CSS keywords are
//! cubic béziers; the named families follow the usual polynomial, sine,
//! exponential, circular, back, elastic and bounce shapes.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

const BACK_C1: f64 = 1.70158;
const BACK_C2: f64 = BACK_C1 * 1.525;
const BACK_C3: f64 = BACK_C1 + 1.0;
const ELASTIC_C4: f64 = TAU / 3.0;
const ELASTIC_C5: f64 = TAU / 4.5;
const BOUNCE_N1: f64 = 7.5625;
const BOUNCE_D1: f64 = 2.75;

const NEWTON_ITERATIONS: usize = 8;
const NEWTON_MIN_SLOPE: f64 = 1e-6;
const SOLVE_PRECISION: f64 = 1e-7;
const BISECTION_ITERATIONS: usize = 64;

/// Easing curve
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    #[default]
    Linear,
    /// CSS `ease`
    Ease,
    /// CSS `ease-in`
    EaseIn,
    /// CSS `ease-out`
    EaseOut,
    /// CSS `ease-in-out`
    EaseInOut,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseInCubic,
    EaseOutCubic,
    EaseInOutCubic,
    EaseInQuart,
    EaseOutQuart,
    EaseInOutQuart,
    EaseInQuint,
    EaseOutQuint,
    EaseInOutQuint,
    EaseInSine,
    EaseOutSine,
    EaseInOutSine,
    EaseInExpo,
    EaseOutExpo,
    EaseInOutExpo,
    EaseInCirc,
    EaseOutCirc,
    EaseInOutCirc,
    EaseInBack,
    EaseOutBack,
    EaseInOutBack,
    EaseInElastic,
    EaseOutElastic,
    EaseInOutElastic,
    EaseInBounce,
    EaseOutBounce,
    EaseInOutBounce,
    /// Cubic bézier through (0,0), (x1,y1), (x2,y2), (1,1)
    CubicBezier(f64, f64, f64, f64),
}

impl Easing {
    /// Eased progress for linear progress `t`, clamped to `[0, 1]`
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match *self {
            Easing::Linear => t,
            Easing::Ease => cubic_bezier(0.25, 0.1, 0.25, 1.0, t),
            Easing::EaseIn => cubic_bezier(0.42, 0.0, 1.0, 1.0, t),
            Easing::EaseOut => cubic_bezier(0.0, 0.0, 0.58, 1.0, t),
            Easing::EaseInOut => cubic_bezier(0.42, 0.0, 0.58, 1.0, t),

            Easing::EaseInQuad => t * t,
            Easing::EaseOutQuad => 1.0 - (1.0 - t).powi(2),
            Easing::EaseInOutQuad => in_out(t, |t| t * t),
            Easing::EaseInCubic => t.powi(3),
            Easing::EaseOutCubic => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOutCubic => in_out(t, |t| t.powi(3)),
            Easing::EaseInQuart => t.powi(4),
            Easing::EaseOutQuart => 1.0 - (1.0 - t).powi(4),
            Easing::EaseInOutQuart => in_out(t, |t| t.powi(4)),
            Easing::EaseInQuint => t.powi(5),
            Easing::EaseOutQuint => 1.0 - (1.0 - t).powi(5),
            Easing::EaseInOutQuint => in_out(t, |t| t.powi(5)),

            Easing::EaseInSine => 1.0 - (t * PI / 2.0).cos(),
            Easing::EaseOutSine => (t * PI / 2.0).sin(),
            Easing::EaseInOutSine => -((PI * t).cos() - 1.0) / 2.0,

            Easing::EaseInExpo => expo_in(t),
            Easing::EaseOutExpo => 1.0 - expo_in(1.0 - t),
            Easing::EaseInOutExpo => in_out(t, expo_in),

            Easing::EaseInCirc => circ_in(t),
            Easing::EaseOutCirc => 1.0 - circ_in(1.0 - t),
            Easing::EaseInOutCirc => in_out(t, circ_in),

            Easing::EaseInBack => BACK_C3 * t.powi(3) - BACK_C1 * t * t,
            Easing::EaseOutBack => {
                1.0 + BACK_C3 * (t - 1.0).powi(3) + BACK_C1 * (t - 1.0).powi(2)
            }
            Easing::EaseInOutBack => {
                if t < 0.5 {
                    ((2.0 * t).powi(2) * ((BACK_C2 + 1.0) * 2.0 * t - BACK_C2)) / 2.0
                } else {
                    ((2.0 * t - 2.0).powi(2) * ((BACK_C2 + 1.0) * (t * 2.0 - 2.0) + BACK_C2)
                        + 2.0)
                        / 2.0
                }
            }

            Easing::EaseInElastic => {
                if t == 0.0 || t == 1.0 {
                    t
                } else {
                    -(2f64.powf(10.0 * t - 10.0)) * ((t * 10.0 - 10.75) * ELASTIC_C4).sin()
                }
            }
            Easing::EaseOutElastic => {
                if t == 0.0 || t == 1.0 {
                    t
                } else {
                    2f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * ELASTIC_C4).sin() + 1.0
                }
            }
            Easing::EaseInOutElastic => {
                if t == 0.0 || t == 1.0 {
                    t
                } else if t < 0.5 {
                    -(2f64.powf(20.0 * t - 10.0) * ((20.0 * t - 11.125) * ELASTIC_C5).sin()) / 2.0
                } else {
                    (2f64.powf(-20.0 * t + 10.0) * ((20.0 * t - 11.125) * ELASTIC_C5).sin()) / 2.0
                        + 1.0
                }
            }

            Easing::EaseInBounce => 1.0 - bounce_out(1.0 - t),
            Easing::EaseOutBounce => bounce_out(t),
            Easing::EaseInOutBounce => {
                if t < 0.5 {
                    (1.0 - bounce_out(1.0 - 2.0 * t)) / 2.0
                } else {
                    (1.0 + bounce_out(2.0 * t - 1.0)) / 2.0
                }
            }

            Easing::CubicBezier(x1, y1, x2, y2) => cubic_bezier(x1, y1, x2, y2, t),
        }
    }
}

/// Mirror an ease-in curve into an ease-in-out curve
fn in_out(t: f64, ease_in: impl Fn(f64) -> f64) -> f64 {
    if t < 0.5 {
        ease_in(2.0 * t) / 2.0
    } else {
        1.0 - ease_in(2.0 - 2.0 * t) / 2.0
    }
}

fn expo_in(t: f64) -> f64 {
    if t == 0.0 {
        0.0
    } else {
        2f64.powf(10.0 * t - 10.0)
    }
}

fn circ_in(t: f64) -> f64 {
    1.0 - (1.0 - t * t).max(0.0).sqrt()
}

fn bounce_out(t: f64) -> f64 {
    if t < 1.0 / BOUNCE_D1 {
        BOUNCE_N1 * t * t
    } else if t < 2.0 / BOUNCE_D1 {
        let t = t - 1.5 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.75
    } else if t < 2.5 / BOUNCE_D1 {
        let t = t - 2.25 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / BOUNCE_D1;
        BOUNCE_N1 * t * t + 0.984375
    }
}

/// Evaluate one axis of the bézier at parameter `s`
fn bezier_axis(p1: f64, p2: f64, s: f64) -> f64 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
}

fn bezier_axis_slope(p1: f64, p2: f64, s: f64) -> f64 {
    let inv = 1.0 - s;
    3.0 * inv * inv * p1 + 6.0 * inv * s * (p2 - p1) + 3.0 * s * s * (1.0 - p2)
}

/// Solve the bézier for `x = t` and return its `y`
fn cubic_bezier(x1: f64, y1: f64, x2: f64, y2: f64, t: f64) -> f64 {
    if t <= 0.0 || t >= 1.0 {
        return t;
    }
    let x1 = x1.clamp(0.0, 1.0);
    let x2 = x2.clamp(0.0, 1.0);

    // Newton-Raphson from the linear guess
    let mut s = t;
    for _ in 0..NEWTON_ITERATIONS {
        let error = bezier_axis(x1, x2, s) - t;
        if error.abs() < SOLVE_PRECISION {
            return bezier_axis(y1, y2, s);
        }
        let slope = bezier_axis_slope(x1, x2, s);
        if slope.abs() < NEWTON_MIN_SLOPE {
            break;
        }
        s -= error / slope;
    }

    // Bisection fallback for flat regions
    let (mut lo, mut hi) = (0.0, 1.0);
    s = t;
    for _ in 0..BISECTION_ITERATIONS {
        let x = bezier_axis(x1, x2, s);
        if (x - t).abs() < SOLVE_PRECISION {
            break;
        }
        if x < t {
            lo = s;
        } else {
            hi = s;
        }
        s = (lo + hi) / 2.0;
    }
    bezier_axis(y1, y2, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Easing; 35] = [
        Easing::Linear,
        Easing::Ease,
        Easing::EaseIn,
        Easing::EaseOut,
        Easing::EaseInOut,
        Easing::EaseInQuad,
        Easing::EaseOutQuad,
        Easing::EaseInOutQuad,
        Easing::EaseInCubic,
        Easing::EaseOutCubic,
        Easing::EaseInOutCubic,
        Easing::EaseInQuart,
        Easing::EaseOutQuart,
        Easing::EaseInOutQuart,
        Easing::EaseInQuint,
        Easing::EaseOutQuint,
        Easing::EaseInOutQuint,
        Easing::EaseInSine,
        Easing::EaseOutSine,
        Easing::EaseInOutSine,
        Easing::EaseInExpo,
        Easing::EaseOutExpo,
        Easing::EaseInOutExpo,
        Easing::EaseInCirc,
        Easing::EaseOutCirc,
        Easing::EaseInOutCirc,
        Easing::EaseInBack,
        Easing::EaseOutBack,
        Easing::EaseInOutBack,
        Easing::EaseInElastic,
        Easing::EaseOutElastic,
        Easing::EaseInOutElastic,
        Easing::EaseInBounce,
        Easing::EaseOutBounce,
        Easing::EaseInOutBounce,
    ];

    #[test]
    fn test_endpoints_are_fixed() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-6, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_input_is_clamped() {
        assert_eq!(Easing::EaseInQuad.apply(-1.0), 0.0);
        assert_eq!(Easing::EaseInQuad.apply(2.0), 1.0);
    }

    #[test]
    fn test_linear_midpoint() {
        assert_eq!(Easing::Linear.apply(0.5), 0.5);
    }

    #[test]
    fn test_symmetric_in_out_midpoint() {
        for easing in [
            Easing::EaseInOut,
            Easing::EaseInOutQuad,
            Easing::EaseInOutCubic,
            Easing::EaseInOutSine,
            Easing::EaseInOutCirc,
        ] {
            assert!((easing.apply(0.5) - 0.5).abs() < 1e-6, "{easing:?}");
        }
    }

    #[test]
    fn test_ease_in_is_slow_then_fast() {
        assert!(Easing::EaseIn.apply(0.25) < 0.25);
        assert!(Easing::EaseOut.apply(0.25) > 0.25);
    }

    #[test]
    fn test_cubic_bezier_matches_preset() {
        let custom = Easing::CubicBezier(0.42, 0.0, 0.58, 1.0);
        for i in 0..=20 {
            let t = i as f64 / 20.0;
            assert!((custom.apply(t) - Easing::EaseInOut.apply(t)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_linear_bezier_is_identity() {
        let linear = Easing::CubicBezier(0.0, 0.0, 1.0, 1.0);
        for i in 0..=10 {
            let t = i as f64 / 10.0;
            assert!((linear.apply(t) - t).abs() < 1e-5);
        }
    }

    #[test]
    fn test_back_overshoots() {
        assert!(Easing::EaseInBack.apply(0.2) < 0.0);
        assert!(Easing::EaseOutBack.apply(0.8) > 1.0);
    }

    #[test]
    fn test_bounce_stays_in_range() {
        for i in 0..=100 {
            let v = Easing::EaseOutBounce.apply(i as f64 / 100.0);
            assert!((0.0..=1.0 + 1e-9).contains(&v));
        }
    }
}
