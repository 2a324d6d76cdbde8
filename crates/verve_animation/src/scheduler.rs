//! Animation scheduler
//!
//! Owns the set of running animations and the queue of delayed starts for one
//! UI thread. Each tick derives a time step from the frame clock, releases the
//! delayed starts that came due, then advances every running animation once in
//! descending priority order. The frame clock runs exactly while there is
//! something to animate or a delay to count down.
//!
//! The scheduler only does bookkeeping. Animations are advanced, activated and
//! stopped by [`crate::tick`] after it has released the context, so their
//! callbacks are free to start, retarget or stop other animations.

use crate::animation::AnimationId;
use crate::clock::{FrameClock, FrameRateRange, FrameTick, ManualFrameClock};
use crate::settings::AnimationSettings;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use slotmap::{new_key_type, SlotMap};
use std::cmp::Reverse;
use std::rc::Rc;

new_key_type! {
    /// Handle to a delayed start waiting in the scheduler
    pub struct DelayId;
}

/// Anything the scheduler can advance
pub(crate) trait AnimationDriver {
    fn id(&self) -> AnimationId;

    /// Higher priorities are advanced first within a tick
    fn priority(&self) -> i32;

    fn is_running(&self) -> bool;

    /// Advance by `delta` seconds
    fn update(&self, delta: f64);

    /// A delayed start came due; returns whether the animation should now run
    fn activate_delayed(&self) -> bool;

    /// Forced stop from [`crate::stop_all_animations`]
    fn interrupt(&self, immediately: bool);
}

pub(crate) type DriverRef = Rc<dyn AnimationDriver>;

struct PendingStart {
    driver: DriverRef,
    remaining: f64,
}

/// Work for one tick, carried out after the context borrow ends
pub(crate) struct TickPlan {
    pub(crate) delta: f64,
    pub(crate) due: Vec<DriverRef>,
    pub(crate) drivers: Vec<DriverRef>,
}

pub(crate) struct AnimationScheduler {
    active: IndexMap<AnimationId, DriverRef, FxBuildHasher>,
    pending: SlotMap<DelayId, PendingStart>,
    clock: Box<dyn FrameClock>,
    clock_running: bool,
    in_tick: bool,
    last_timestamp: Option<f64>,
    frame_count: u64,
}

impl AnimationScheduler {
    pub(crate) fn new() -> Self {
        Self {
            active: IndexMap::default(),
            pending: SlotMap::with_key(),
            clock: Box::new(ManualFrameClock::new()),
            clock_running: false,
            in_tick: false,
            last_timestamp: None,
            frame_count: 0,
        }
    }

    /// Swap in a platform clock, returning the previous one
    pub(crate) fn install_clock(
        &mut self,
        mut clock: Box<dyn FrameClock>,
        range: FrameRateRange,
    ) -> Box<dyn FrameClock> {
        clock.set_preferred_frame_rate_range(range);
        if self.clock_running {
            self.clock.stop();
            clock.start();
        }
        std::mem::replace(&mut self.clock, clock)
    }

    pub(crate) fn set_preferred_frame_rate_range(&mut self, range: FrameRateRange) {
        self.clock.set_preferred_frame_rate_range(range);
    }

    /// Add a running animation to the active set
    pub(crate) fn run_animation(&mut self, driver: DriverRef) {
        let id = driver.id();
        if self.active.insert(id, driver).is_none() {
            tracing::trace!("{:?} joined the active set", id);
        }
        self.ensure_clock();
    }

    pub(crate) fn remove(&mut self, id: AnimationId) -> Option<DriverRef> {
        let removed = self.active.shift_remove(&id);
        self.stop_clock_if_idle();
        removed
    }

    /// Queue `driver` to start after `delay` seconds of ticks
    pub(crate) fn schedule_start(&mut self, driver: DriverRef, delay: f64) -> DelayId {
        let token = self.pending.insert(PendingStart {
            driver,
            remaining: delay,
        });
        self.ensure_clock();
        token
    }

    pub(crate) fn cancel_start(&mut self, token: DelayId) -> Option<DriverRef> {
        let removed = self.pending.remove(token).map(|pending| pending.driver);
        self.stop_clock_if_idle();
        removed
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.active.is_empty() && self.pending.is_empty()
    }

    pub(crate) fn is_clock_running(&self) -> bool {
        self.clock_running
    }

    /// Every running or delayed animation
    pub(crate) fn drivers(&self) -> Vec<DriverRef> {
        self.active
            .values()
            .cloned()
            .chain(self.pending.values().map(|pending| pending.driver.clone()))
            .collect()
    }

    /// Derive the time step and collect the work for this tick
    pub(crate) fn begin_tick(
        &mut self,
        tick: FrameTick,
        settings: &AnimationSettings,
    ) -> Option<TickPlan> {
        if self.is_idle() {
            self.stop_clock_if_idle();
            return None;
        }

        let raw = match self.last_timestamp {
            Some(last) => tick.timestamp - last,
            None => tick.frame_duration,
        };
        self.last_timestamp = Some(tick.timestamp);
        self.frame_count += 1;
        let delta = raw.max(0.0).min(settings.max_frame_delta) / settings.slowdown;

        let mut due_tokens = Vec::new();
        for (token, pending) in self.pending.iter_mut() {
            pending.remaining -= delta;
            if pending.remaining <= 0.0 {
                due_tokens.push(token);
            }
        }
        let due = due_tokens
            .into_iter()
            .filter_map(|token| self.pending.remove(token))
            .map(|pending| pending.driver)
            .collect();

        let mut drivers: Vec<DriverRef> = self.active.values().cloned().collect();
        drivers.sort_by_key(|driver| Reverse(driver.priority()));

        self.in_tick = true;
        tracing::trace!(
            "frame {}: dt={:.4}s, {} active, {} delayed",
            self.frame_count,
            delta,
            drivers.len(),
            self.pending.len()
        );

        Some(TickPlan {
            delta,
            due,
            drivers,
        })
    }

    /// Drop animations that stopped during the tick, returning them so the
    /// caller can release them outside the context borrow
    pub(crate) fn end_tick(&mut self) -> Vec<DriverRef> {
        let mut finished = Vec::new();
        self.active.retain(|_, driver| {
            if driver.is_running() {
                true
            } else {
                finished.push(driver.clone());
                false
            }
        });
        self.in_tick = false;
        self.stop_clock_if_idle();
        finished
    }

    fn ensure_clock(&mut self) {
        if !self.clock_running {
            self.clock_running = true;
            self.last_timestamp = None;
            self.clock.start();
            tracing::debug!("frame clock started");
        }
    }

    fn stop_clock_if_idle(&mut self) {
        if self.clock_running && !self.in_tick && self.is_idle() {
            self.clock_running = false;
            self.clock.stop();
            tracing::debug!("frame clock stopped after {} frames", self.frame_count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    struct FakeDriver {
        id: AnimationId,
        priority: i32,
        remaining_updates: Cell<u32>,
        log: Rc<RefCell<Vec<AnimationId>>>,
    }

    impl AnimationDriver for FakeDriver {
        fn id(&self) -> AnimationId {
            self.id
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn is_running(&self) -> bool {
            self.remaining_updates.get() > 0
        }

        fn update(&self, _delta: f64) {
            self.log.borrow_mut().push(self.id);
            self.remaining_updates
                .set(self.remaining_updates.get().saturating_sub(1));
        }

        fn activate_delayed(&self) -> bool {
            true
        }

        fn interrupt(&self, _immediately: bool) {
            self.remaining_updates.set(0);
        }
    }

    fn driver(
        raw: u64,
        priority: i32,
        updates: u32,
        log: &Rc<RefCell<Vec<AnimationId>>>,
    ) -> DriverRef {
        Rc::new(FakeDriver {
            id: AnimationId::from_raw(raw),
            priority,
            remaining_updates: Cell::new(updates),
            log: log.clone(),
        })
    }

    fn run_tick(scheduler: &mut AnimationScheduler, tick: FrameTick) {
        let settings = AnimationSettings::default();
        if let Some(plan) = scheduler.begin_tick(tick, &settings) {
            for driver in &plan.drivers {
                driver.update(plan.delta);
            }
            scheduler.end_tick();
        }
    }

    #[test]
    fn test_clock_runs_only_while_busy() {
        let clock = ManualFrameClock::new();
        let mut scheduler = AnimationScheduler::new();
        scheduler.install_clock(Box::new(clock.clone()), FrameRateRange::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        assert!(!clock.is_running());
        scheduler.run_animation(driver(1, 0, 2, &log));
        assert!(clock.is_running());

        run_tick(&mut scheduler, FrameTick::at_rate(1, 60.0));
        assert!(clock.is_running());
        run_tick(&mut scheduler, FrameTick::at_rate(2, 60.0));
        assert!(!clock.is_running());
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!((clock.start_count(), clock.stop_count()), (1, 1));
    }

    #[test]
    fn test_priority_order_is_stable() {
        let mut scheduler = AnimationScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.run_animation(driver(1, 0, 1, &log));
        scheduler.run_animation(driver(2, 10, 1, &log));
        scheduler.run_animation(driver(3, 0, 1, &log));
        scheduler.run_animation(driver(4, 10, 1, &log));

        run_tick(&mut scheduler, FrameTick::at_rate(1, 60.0));
        let order: Vec<u64> = log.borrow().iter().map(|id| id.to_raw()).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_delta_from_timestamps_is_clamped() {
        let mut scheduler = AnimationScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scheduler.run_animation(driver(1, 0, 10, &log));
        let settings = AnimationSettings::default();

        let first = scheduler
            .begin_tick(FrameTick::new(5.0, 1.0 / 60.0), &settings)
            .unwrap();
        assert!((first.delta - 1.0 / 60.0).abs() < 1e-12);
        scheduler.end_tick();

        let second = scheduler
            .begin_tick(FrameTick::new(5.02, 1.0 / 60.0), &settings)
            .unwrap();
        assert!((second.delta - 0.02).abs() < 1e-9);
        scheduler.end_tick();

        let stalled = scheduler
            .begin_tick(FrameTick::new(9.0, 1.0 / 60.0), &settings)
            .unwrap();
        assert_eq!(stalled.delta, settings.max_frame_delta);
        scheduler.end_tick();
    }

    #[test]
    fn test_delayed_start_comes_due() {
        let clock = ManualFrameClock::new();
        let mut scheduler = AnimationScheduler::new();
        scheduler.install_clock(Box::new(clock.clone()), FrameRateRange::default());
        let log = Rc::new(RefCell::new(Vec::new()));
        let settings = AnimationSettings::default();

        scheduler.schedule_start(driver(1, 0, 1, &log), 0.04);
        assert!(clock.is_running());

        let mut released = 0;
        for frame in 1..=3 {
            let plan = scheduler
                .begin_tick(FrameTick::at_rate(frame, 60.0), &settings)
                .unwrap();
            released += plan.due.len();
            scheduler.end_tick();
        }
        assert_eq!(released, 1);
        assert_eq!(scheduler.pending_count(), 0);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_cancelled_start_releases_clock() {
        let clock = ManualFrameClock::new();
        let mut scheduler = AnimationScheduler::new();
        scheduler.install_clock(Box::new(clock.clone()), FrameRateRange::default());
        let log = Rc::new(RefCell::new(Vec::new()));

        let token = scheduler.schedule_start(driver(1, 0, 1, &log), 1.0);
        assert!(scheduler.cancel_start(token).is_some());
        assert!(!clock.is_running());
        assert!(scheduler.cancel_start(token).is_none());
    }
}
