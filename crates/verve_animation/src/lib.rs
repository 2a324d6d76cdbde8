//! Verve Animation Runtime
//!
//! Interruptible property animations for UI object graphs.
//!
//! # Features
//!
//! - **Implicit Animation**: Plain property writes inside an `animate()` block
//!   become animated transitions
//! - **Spring Physics**: Closed-form damped springs with stiffness, damping,
//!   mass or response/damping-ratio parameters
//! - **Easing Curves**: Cubic bezier and the usual named curve families
//! - **Momentum Decay**: Flick-style deceleration toward a target or free flight
//! - **Interruptible**: Retargeting keeps springs continuous in value and velocity
//! - **Group Completion**: One callback per block, once all its animations settle
//! - **Single Driver**: One scheduler per UI thread advances every animation with
//!   a shared time step and runs the frame clock only while needed
//!
//! # Example
//!
//! ```ignore
//! use verve_animation::{animatable_property, animate, tick, Animated, FrameTick};
//!
//! struct Card { opacity: f64 }
//! animatable_property!(fn opacity(Card => f64) = opacity);
//!
//! let card = Animated::new(Card { opacity: 0.0 });
//! animate().gentle().run(|| card.animator().set(opacity(), 1.0));
//!
//! for frame in 1..=120 {
//!     tick(FrameTick::at_rate(frame, 60.0));
//! }
//! assert_eq!(card.borrow().opacity, 1.0);
//! ```

pub mod animation;
pub mod clock;
pub mod context;
pub mod decay;
pub mod easing;
pub mod error;
pub mod group;
pub mod property;
pub mod scheduler;
pub mod scope;
pub mod settings;
pub mod spring;
pub mod values;

pub use animation::{
    AnimationEvent, AnimationId, AnimationKind, AnimationOptions, AnimationPosition,
    AnimationState, PropertyAnimation, WeakAnimation,
};
pub use clock::{FrameClock, FrameRateRange, FrameTick, ManualFrameClock};
pub use context::{
    active_animation_count, apply_settings, install_frame_clock, is_frame_clock_running,
    pending_start_count, set_preferred_frame_rate_range, settings, stop_all_animations, tick,
};
pub use decay::DecayConfig;
pub use easing::Easing;
pub use error::{AnimationError, Result};
pub use group::{pending_members, GroupCompletion, GroupId};
pub use property::{Animated, Animator, Property, PropertyKey, WeakAnimated};
pub use scheduler::DelayId;
pub use scope::{
    animate, current_frame, run_animation_block, without_animation, Animate, AnimationFrame,
};
pub use settings::AnimationSettings;
pub use spring::SpringConfig;
pub use values::{Animatable, AnimatableVector, CollectionPadding};
