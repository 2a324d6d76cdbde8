//! Frame clock seam
//!
//! The scheduler never owns a timer. It asks a [`FrameClock`] to start when
//! the first animation becomes active and to stop once nothing is left, and
//! the platform (display link, vsync callback, test harness) answers by
//! calling [`crate::tick`] once per frame with a [`FrameTick`].

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

/// One display frame delivered by the platform
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTick {
    /// Monotonic time of the frame in seconds
    pub timestamp: f64,
    /// Nominal duration of one frame in seconds, used for the first tick
    /// after the clock starts
    pub frame_duration: f64,
}

impl FrameTick {
    pub fn new(timestamp: f64, frame_duration: f64) -> Self {
        Self {
            timestamp,
            frame_duration,
        }
    }

    /// Tick for frame number `frame` at a fixed rate
    pub fn at_rate(frame: u64, fps: f64) -> Self {
        let frame_duration = 1.0 / fps;
        Self::new(frame as f64 * frame_duration, frame_duration)
    }
}

/// Preferred display refresh range, in frames per second
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameRateRange {
    pub min: f32,
    pub max: f32,
    pub preferred: Option<f32>,
}

impl FrameRateRange {
    pub fn new(min: f32, max: f32, preferred: Option<f32>) -> Self {
        Self {
            min,
            max,
            preferred,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min > 0.0
            && self.min <= self.max
            && self
                .preferred
                .map_or(true, |p| p >= self.min && p <= self.max)
    }
}

impl Default for FrameRateRange {
    fn default() -> Self {
        Self::new(30.0, 120.0, Some(60.0))
    }
}

/// Platform frame source driven by the scheduler
pub trait FrameClock {
    /// Begin delivering ticks
    fn start(&mut self);

    /// Stop delivering ticks
    fn stop(&mut self);

    /// Hint the refresh rate the running animations want
    fn set_preferred_frame_rate_range(&mut self, _range: FrameRateRange) {}
}

#[derive(Debug, Default)]
struct ManualClockState {
    running: Cell<bool>,
    starts: Cell<u32>,
    stops: Cell<u32>,
    range: Cell<Option<FrameRateRange>>,
}

/// Headless frame clock
///
/// Records what the scheduler asked for; ticks are delivered by whoever
/// holds a clone. This is the clock every context starts with.
#[derive(Clone, Debug, Default)]
pub struct ManualFrameClock {
    state: Rc<ManualClockState>,
}

impl ManualFrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    /// Number of times the scheduler started this clock
    pub fn start_count(&self) -> u32 {
        self.state.starts.get()
    }

    /// Number of times the scheduler stopped this clock
    pub fn stop_count(&self) -> u32 {
        self.state.stops.get()
    }

    pub fn frame_rate_range(&self) -> Option<FrameRateRange> {
        self.state.range.get()
    }
}

impl FrameClock for ManualFrameClock {
    fn start(&mut self) {
        self.state.running.set(true);
        self.state.starts.set(self.state.starts.get() + 1);
    }

    fn stop(&mut self) {
        self.state.running.set(false);
        self.state.stops.set(self.state.stops.get() + 1);
    }

    fn set_preferred_frame_rate_range(&mut self, range: FrameRateRange) {
        self.state.range.set(Some(range));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_clones_share_state() {
        let clock = ManualFrameClock::new();
        let mut handle = clock.clone();
        handle.start();
        assert!(clock.is_running());
        handle.stop();
        assert!(!clock.is_running());
        assert_eq!((clock.start_count(), clock.stop_count()), (1, 1));
    }

    #[test]
    fn test_frame_rate_range_validation() {
        assert!(FrameRateRange::default().is_valid());
        assert!(!FrameRateRange::new(120.0, 60.0, None).is_valid());
        assert!(!FrameRateRange::new(30.0, 60.0, Some(90.0)).is_valid());
    }

    #[test]
    fn test_tick_at_rate() {
        let tick = FrameTick::at_rate(30, 60.0);
        assert!((tick.timestamp - 0.5).abs() < 1e-12);
        assert!((tick.frame_duration - 1.0 / 60.0).abs() < 1e-12);
    }
}
