//! Per-thread animation runtime
//!
//! The scheduler, the configuration scope stack, the group tracker and the
//! active settings live together in one thread-local [`AnimationContext`].
//! Property writes discover the current animation block through it without a
//! context parameter threaded through every call.
//!
//! Every entry point asserts it runs on the UI thread. The context is only
//! ever borrowed for short bookkeeping sections; animation updates and user
//! callbacks run after the borrow has ended.

use crate::clock::{FrameClock, FrameRateRange, FrameTick};
use crate::error::Result;
use crate::group::GroupTracker;
use crate::scheduler::AnimationScheduler;
use crate::scope::ScopeStack;
use crate::settings::AnimationSettings;
use std::cell::RefCell;

pub(crate) struct AnimationContext {
    pub(crate) scheduler: AnimationScheduler,
    pub(crate) scopes: ScopeStack,
    pub(crate) groups: GroupTracker,
    pub(crate) settings: AnimationSettings,
}

impl AnimationContext {
    fn new() -> Self {
        Self {
            scheduler: AnimationScheduler::new(),
            scopes: ScopeStack::default(),
            groups: GroupTracker::default(),
            settings: AnimationSettings::default(),
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<AnimationContext> = RefCell::new(AnimationContext::new());
}

/// Run `f` with exclusive access to the calling thread's context
///
/// # Panics
///
/// Panics off the UI thread, or when called re-entrantly from inside `f`.
#[track_caller]
pub(crate) fn with_context<R>(f: impl FnOnce(&mut AnimationContext) -> R) -> R {
    verve_core::assert_ui_thread("the animation runtime");
    CONTEXT.with(|cell| match cell.try_borrow_mut() {
        Ok(mut cx) => f(&mut cx),
        Err(_) => panic!("animation context accessed re-entrantly"),
    })
}

/// Like [`with_context`], but gives up instead of panicking
///
/// Used from `Drop` impls, which may run during unwinding or thread teardown.
pub(crate) fn try_with_context<R>(f: impl FnOnce(&mut AnimationContext) -> R) -> Option<R> {
    if !verve_core::is_ui_thread() {
        return None;
    }
    CONTEXT
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut cx| f(&mut cx)))
        .ok()
        .flatten()
}

/// Deliver one frame from the platform clock
///
/// Releases due delayed starts, then advances every running animation once
/// with a shared time step, highest priority first.
pub fn tick(frame: FrameTick) {
    let Some(plan) = with_context(|cx| cx.scheduler.begin_tick(frame, &cx.settings)) else {
        return;
    };

    for driver in &plan.due {
        if driver.activate_delayed() {
            let driver = driver.clone();
            with_context(|cx| cx.scheduler.run_animation(driver));
        }
    }

    for driver in &plan.drivers {
        if driver.is_running() {
            driver.update(plan.delta);
        }
    }

    let finished = with_context(|cx| cx.scheduler.end_tick());
    drop(finished);
    drop(plan);
}

/// Stop every running or delayed animation on this thread
///
/// With `immediately == false` springs and decays coast to rest where they
/// are instead of freezing.
pub fn stop_all_animations(immediately: bool) {
    let drivers = with_context(|cx| cx.scheduler.drivers());
    tracing::debug!("stopping {} animations", drivers.len());
    for driver in drivers {
        driver.interrupt(immediately);
    }
}

/// Hand the scheduler a platform frame clock
///
/// The clock is started right away if animations are already running.
pub fn install_frame_clock(clock: impl FrameClock + 'static) {
    let previous = with_context(|cx| {
        let range = cx.settings.frame_rate;
        cx.scheduler.install_clock(Box::new(clock), range)
    });
    drop(previous);
}

pub fn set_preferred_frame_rate_range(range: FrameRateRange) {
    with_context(|cx| {
        cx.settings.frame_rate = range;
        cx.scheduler.set_preferred_frame_rate_range(range);
    });
}

/// Validate and install settings for this thread
///
/// Tolerances and collection padding apply to animations created afterwards;
/// time scaling and the frame rate take effect on the next tick.
pub fn apply_settings(settings: AnimationSettings) -> Result<()> {
    settings.validate()?;
    with_context(|cx| {
        cx.scheduler.set_preferred_frame_rate_range(settings.frame_rate);
        cx.settings = settings;
    });
    tracing::debug!("animation settings applied");
    Ok(())
}

/// Settings currently in effect on this thread
pub fn settings() -> AnimationSettings {
    with_context(|cx| cx.settings.clone())
}

/// Number of animations advanced by the next tick
pub fn active_animation_count() -> usize {
    with_context(|cx| cx.scheduler.active_count())
}

/// Number of delayed starts still counting down
pub fn pending_start_count() -> usize {
    with_context(|cx| cx.scheduler.pending_count())
}

pub fn is_frame_clock_running() -> bool {
    with_context(|cx| cx.scheduler.is_clock_running())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualFrameClock;
    use crate::{AnimationKind, AnimationPosition, Easing, PropertyAnimation};

    fn easing(seconds: f64) -> AnimationKind {
        AnimationKind::Easing {
            curve: Easing::Linear,
            duration: seconds,
        }
    }

    #[test]
    fn test_clock_follows_active_set() {
        let clock = ManualFrameClock::new();
        install_frame_clock(clock.clone());

        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(easing(0.025));
        animation.set_target(1.0);
        animation.start(0.0);
        assert!(clock.is_running());
        assert_eq!(active_animation_count(), 1);

        tick(FrameTick::at_rate(1, 60.0));
        tick(FrameTick::at_rate(2, 60.0));
        assert!(!animation.is_running());
        assert!(!clock.is_running());
        assert!(!is_frame_clock_running());

        animation.set_target(0.0);
        animation.start(0.0);
        assert!(clock.is_running());
        assert_eq!(clock.start_count(), 2);
        animation.stop(AnimationPosition::End, true);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_shared_delta_per_tick() {
        let a = PropertyAnimation::new(0.0_f64);
        let b = PropertyAnimation::new(100.0_f64);
        for (animation, target) in [(&a, 10.0), (&b, 110.0)] {
            animation.set_kind(easing(1.0));
            animation.set_target(target);
            animation.start(0.0);
        }
        for frame in 1..=15 {
            tick(FrameTick::at_rate(frame, 60.0));
        }
        assert!((a.fraction_complete() - b.fraction_complete()).abs() < 1e-12);
        assert!(((b.value() - 100.0) - a.value()).abs() < 1e-9);
        stop_all_animations(true);
        assert_eq!(active_animation_count(), 0);
    }

    #[test]
    fn test_slowdown_scales_time() {
        apply_settings(AnimationSettings {
            slowdown: 2.0,
            ..Default::default()
        })
        .unwrap();

        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(easing(1.0));
        animation.set_target(1.0);
        animation.start(0.0);
        for frame in 1..=30 {
            tick(FrameTick::at_rate(frame, 60.0));
        }
        assert!((animation.fraction_complete() - 0.25).abs() < 1e-9);
        stop_all_animations(true);
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let broken = AnimationSettings {
            max_frame_delta: 0.0,
            ..Default::default()
        };
        assert!(apply_settings(broken).is_err());
        assert_eq!(settings(), AnimationSettings::default());
    }

    #[test]
    fn test_stop_all_coasting_keeps_springs_running() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_target(50.0);
        animation.start(0.0);
        tick(FrameTick::at_rate(1, 60.0));

        stop_all_animations(false);
        assert!(animation.is_running());
        assert_eq!(animation.target(), animation.value());
        stop_all_animations(true);
        assert!(!animation.is_running());
    }

    #[test]
    fn test_frame_rate_range_reaches_clock() {
        let clock = ManualFrameClock::new();
        install_frame_clock(clock.clone());
        let range = FrameRateRange::new(60.0, 120.0, Some(120.0));
        set_preferred_frame_rate_range(range);
        assert_eq!(clock.frame_rate_range(), Some(range));
        assert_eq!(settings().frame_rate, range);
    }
}
