//! Property animation state machine
//!
//! One [`PropertyAnimation`] drives one property of one object. It holds the
//! value, velocity, target and start value in vector form, the model that
//! moves value toward target, and the lifecycle:
//!
//! ```text
//! Inactive --start--> Running --converged / stop--> Inactive
//!     ^                  |
//!     +------pause-------+
//! ```
//!
//! Changing the target of a running machine retargets it in place. Springs and
//! decays keep their velocity, easing curves restart from the current value,
//! and a `Retargeted` event is emitted instead of a terminal one.
//!
//! Callbacks (`on_value_changed`, `completion`) are invoked without any
//! borrow held, so they may freely read, retarget or stop this or any other
//! animation.

use crate::context;
use crate::decay::DecayConfig;
use crate::easing::Easing;
use crate::error::{invalid, Result};
use crate::group::{self, GroupId};
use crate::scheduler::{AnimationDriver, DelayId, DriverRef};
use crate::settings::AnimationSettings;
use crate::spring::SpringConfig;
use crate::values::{Animatable, AnimatableVector, CollectionPadding};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Identity and Configuration
// ============================================================================

/// Process-unique animation identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimationId(u64);

impl AnimationId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }
}

/// The model that moves a value toward its target
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnimationKind {
    Spring(SpringConfig),
    Easing { curve: Easing, duration: f64 },
    Decay(DecayConfig),
}

impl AnimationKind {
    /// Physical models carry velocity across retargets and can coast to a stop
    pub fn preserves_velocity(&self) -> bool {
        !matches!(self, AnimationKind::Easing { .. })
    }

    /// Check the model's parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            AnimationKind::Spring(config) => config.validate(),
            AnimationKind::Easing { duration, .. } => {
                if duration.is_finite() && *duration >= 0.0 {
                    Ok(())
                } else {
                    Err(invalid(
                        "easing.duration",
                        format!("must be a non-negative number, got {duration}"),
                    ))
                }
            }
            AnimationKind::Decay(config) => config.validate(),
        }
    }

    /// This model, or the default of its family if its parameters are unusable
    pub fn sanitized(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(err) => {
                tracing::warn!("{err}; using the default {self:?} model");
                match self {
                    AnimationKind::Spring(_) => AnimationKind::Spring(SpringConfig::default()),
                    AnimationKind::Easing { curve, .. } => AnimationKind::Easing {
                        curve,
                        duration: 0.0,
                    },
                    AnimationKind::Decay(_) => AnimationKind::Decay(DecayConfig::default()),
                }
            }
        }
    }
}

impl Default for AnimationKind {
    fn default() -> Self {
        AnimationKind::Spring(SpringConfig::default())
    }
}

/// Per-run behaviour flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnimationOptions {
    /// Start over after converging instead of finishing
    pub repeats: bool,
    /// With `repeats`, swap start and target on every cycle
    pub autoreverses: bool,
    /// Round delivered values to whole units
    pub integralize: bool,
    /// Drop spring velocity when retargeting
    pub reset_velocity: bool,
    /// Report the owner as non-interactive while running
    pub prevent_interaction: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnimationState {
    #[default]
    Inactive,
    Running,
}

/// Where a stopped animation leaves its value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationPosition {
    Start,
    Current,
    End,
}

/// Delivered to the completion callback
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationEvent<V> {
    /// The run ended; `at` is the value it ended on
    Finished { at: V },
    /// The target moved while running; the run continues
    Retargeted { from: V, to: V },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DecayMode {
    /// Velocity solved so the value comes to rest on the target
    Target,
    /// Free flight; the target tracks the projected resting value
    Velocity,
}

#[derive(Clone, Copy, Debug)]
struct Tolerances {
    position_epsilon: f64,
    velocity_epsilon: f64,
    decay_velocity_epsilon: f64,
    padding: CollectionPadding,
}

impl From<&AnimationSettings> for Tolerances {
    fn from(settings: &AnimationSettings) -> Self {
        Self {
            position_epsilon: settings.position_epsilon,
            velocity_epsilon: settings.velocity_epsilon,
            decay_velocity_epsilon: settings.decay_velocity_epsilon,
            padding: settings.collection_padding,
        }
    }
}

type ValueCallback<V> = Rc<dyn Fn(&V)>;
type EventCallback<V> = Rc<dyn Fn(AnimationEvent<V>)>;

// ============================================================================
// Machine State
// ============================================================================

struct AnimationInner<V> {
    label: &'static str,
    state: AnimationState,
    /// A run was started and has not finished (running, delayed or paused)
    run_active: bool,
    value: AnimatableVector,
    velocity: AnimatableVector,
    target: AnimatableVector,
    start: AnimatableVector,
    target_value: V,
    /// Logical length to truncate to once a shrinking collection converges
    pending_len: Option<usize>,
    kind: AnimationKind,
    fraction: f64,
    decay_mode: DecayMode,
    options: AnimationOptions,
    delay: f64,
    pending_start: Option<DelayId>,
    priority: i32,
    group: Option<GroupId>,
    tolerances: Tolerances,
    on_value_changed: Option<ValueCallback<V>>,
    completion: Option<EventCallback<V>>,
}

impl<V: Animatable> AnimationInner<V> {
    /// The value handed to callbacks; exactly `target_value` once on target
    fn delivered(&self) -> V {
        if self.options.integralize {
            V::from_vector_like(&self.value.rounded(), &self.target_value)
        } else if self.value == self.target {
            self.target_value.clone()
        } else {
            V::from_vector_like(&self.value, &self.target_value)
        }
    }

    fn rebuild(&self, vector: &AnimatableVector) -> V {
        V::from_vector_like(vector, &self.target_value)
    }

    fn is_scheduled(&self) -> bool {
        self.state == AnimationState::Running || self.pending_start.is_some()
    }

    /// Put the machine at rest on `value`
    fn rest_at(&mut self, value: V) {
        let vector = value.to_vector();
        self.velocity = AnimatableVector::zeros(vector.len());
        self.start = vector.clone();
        self.target = vector.clone();
        self.value = vector;
        self.target_value = value;
        self.pending_len = None;
        self.fraction = 0.0;
    }

    fn position(&self, at: AnimationPosition) -> AnimatableVector {
        match at {
            AnimationPosition::Start => self.start.clone(),
            AnimationPosition::Current => self.value.clone(),
            AnimationPosition::End => self.target.clone(),
        }
    }

    /// Install a new target, reconciling arity and resetting progress
    fn apply_target(&mut self, target: V) {
        let padding = self.tolerances.padding;
        let mut vector = target.to_vector();
        let logical_len = vector.len();
        let current_len = self.value.len();
        self.pending_len = None;

        if logical_len > current_len {
            let grow = |from: &AnimatableVector| match padding {
                CollectionPadding::Truncate => {
                    let mut grown = from.resized(current_len, 0.0);
                    grown.extend_from_slice(&vector.as_slice()[current_len..]);
                    grown
                }
                padding => V::resize_vector(from, logical_len, padding),
            };
            self.value = grow(&self.value);
            self.start = grow(&self.start);
        } else if logical_len < current_len {
            match padding {
                CollectionPadding::Truncate => {
                    self.value.truncate(logical_len);
                    self.start.truncate(logical_len);
                }
                padding => {
                    vector = V::resize_vector(&vector, current_len, padding);
                    self.pending_len = Some(logical_len);
                }
            }
        }
        let len = self.value.len();
        self.velocity = self.velocity.resized(len, 0.0);
        V::align_vector(&mut vector, &self.value);
        self.target = vector;
        self.target_value = target;

        self.start = self.value.clone();
        self.fraction = 0.0;
        match self.kind {
            AnimationKind::Spring(_) => {
                if self.options.reset_velocity {
                    self.velocity = AnimatableVector::zeros(len);
                }
            }
            AnimationKind::Easing { .. } => {}
            AnimationKind::Decay(config) => self.aim_decay(config),
        }
    }

    fn aim_decay(&mut self, config: DecayConfig) {
        self.decay_mode = DecayMode::Target;
        self.velocity = (&self.target - &self.value)
            .iter()
            .map(|displacement| config.velocity_to_travel(*displacement))
            .collect();
    }

    fn configure(&mut self, kind: AnimationKind) {
        self.kind = kind;
        self.start = self.value.clone();
        self.fraction = 0.0;
        match kind {
            AnimationKind::Spring(_) => {}
            AnimationKind::Easing { .. } => {
                self.velocity = AnimatableVector::zeros(self.value.len());
            }
            AnimationKind::Decay(config) => self.aim_decay(config),
        }
    }

    /// Advance by `delta` seconds; returns whether the model converged
    fn step(&mut self, delta: f64) -> bool {
        let len = self.value.len();
        if self.velocity.len() != len {
            self.velocity = self.velocity.resized(len, 0.0);
        }
        if self.target.len() != len {
            self.target = self.target.resized(len, 0.0);
        }

        match self.kind {
            AnimationKind::Spring(config) => {
                for i in 0..len {
                    let target = self.target[i];
                    let (x, v) = config.advance(self.value[i] - target, self.velocity[i], delta);
                    self.value[i] = target + x;
                    self.velocity[i] = v;
                }
                let eps = self.tolerances;
                let settled = (&self.value - &self.target).magnitude_squared()
                    < eps.position_epsilon * eps.position_epsilon
                    && self.velocity.magnitude_squared()
                        < eps.velocity_epsilon * eps.velocity_epsilon;
                if settled {
                    self.snap_to_target();
                }
                settled
            }
            AnimationKind::Easing { curve, duration } => {
                self.fraction = if duration > 0.0 {
                    (self.fraction + delta / duration).min(1.0)
                } else {
                    1.0
                };
                let progress = curve.apply(self.fraction);
                let next = &self.start + &(&(&self.target - &self.start) * progress);
                if delta > 0.0 {
                    self.velocity = (&next - &self.value) * (1.0 / delta);
                }
                self.value = next;
                if self.fraction >= 1.0 {
                    self.snap_to_target();
                    true
                } else {
                    false
                }
            }
            AnimationKind::Decay(config) => {
                for i in 0..len {
                    let (dx, v) = config.advance(self.velocity[i], delta);
                    self.value[i] += dx;
                    self.velocity[i] = v;
                }
                if self.decay_mode == DecayMode::Velocity {
                    self.target = self
                        .value
                        .iter()
                        .zip(self.velocity.iter())
                        .map(|(x, v)| x + config.resting_displacement(*v))
                        .collect();
                    self.target_value = self.rebuild(&self.target);
                }
                let eps = self.tolerances.decay_velocity_epsilon;
                let settled = self.velocity.magnitude_squared() < eps * eps;
                if settled {
                    self.snap_to_target();
                }
                settled
            }
        }
    }

    fn snap_to_target(&mut self) {
        self.value = self.target.clone();
        self.velocity = AnimatableVector::zeros(self.value.len());
    }

    /// Set up the next cycle of a repeating run
    fn begin_next_cycle(&mut self) {
        if self.options.autoreverses {
            std::mem::swap(&mut self.start, &mut self.target);
            self.target_value = self.rebuild(&self.target);
        } else {
            self.value = self.start.clone();
        }
        self.fraction = 0.0;
        self.velocity = AnimatableVector::zeros(self.value.len());
        if let AnimationKind::Decay(config) = self.kind {
            self.aim_decay(config);
        }
    }

    fn apply_pending_truncation(&mut self) {
        if let Some(len) = self.pending_len.take() {
            self.value.truncate(len);
            self.velocity.truncate(len);
            self.target.truncate(len);
            self.start.truncate(len);
        }
    }
}

pub(crate) struct AnimationCell<V> {
    id: AnimationId,
    inner: RefCell<AnimationInner<V>>,
}

// ============================================================================
// Lifecycle
// ============================================================================

impl<V: Animatable> AnimationCell<V> {
    fn emit_value(&self) {
        let (callback, value) = {
            let inner = self.inner.borrow();
            match inner.on_value_changed.clone() {
                Some(callback) => (callback, inner.delivered()),
                None => return,
            }
        };
        callback(&value);
    }

    fn emit_event(&self, event: AnimationEvent<V>) {
        let callback = self.inner.borrow().completion.clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn start(self: &Rc<Self>, after_delay: f64) {
        debug_assert!(
            after_delay >= 0.0,
            "animation delay must be non-negative, got {after_delay}"
        );
        let delay = if after_delay > 0.0 { after_delay } else { 0.0 };

        let stale_token = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == AnimationState::Running {
                return;
            }
            inner.run_active = true;
            inner.delay = delay;
            inner.pending_start.take()
        };
        let driver: DriverRef = self.clone();

        if delay > 0.0 {
            let (token, stale) = context::with_context(|cx| {
                let stale = stale_token.and_then(|token| cx.scheduler.cancel_start(token));
                (cx.scheduler.schedule_start(driver, delay), stale)
            });
            self.inner.borrow_mut().pending_start = Some(token);
            drop(stale);
            tracing::trace!("{:?} ({}) starts in {:.3}s", self.id, self.label(), delay);
        } else {
            self.inner.borrow_mut().state = AnimationState::Running;
            let stale = context::with_context(|cx| {
                let stale = stale_token.and_then(|token| cx.scheduler.cancel_start(token));
                cx.scheduler.run_animation(driver);
                stale
            });
            drop(stale);
            tracing::trace!("{:?} ({}) started", self.id, self.label());
        }
    }

    fn pause(&self) {
        let (was_running, token) = {
            let mut inner = self.inner.borrow_mut();
            let was_running = inner.state == AnimationState::Running;
            inner.state = AnimationState::Inactive;
            (was_running, inner.pending_start.take())
        };
        if !was_running && token.is_none() {
            return;
        }
        let removed = self.deregister(was_running, token);
        drop(removed);
        tracing::trace!("{:?} ({}) paused", self.id, self.label());
    }

    fn deregister(
        &self,
        was_running: bool,
        token: Option<DelayId>,
    ) -> (Option<DriverRef>, Option<DriverRef>) {
        if !was_running && token.is_none() {
            return (None, None);
        }
        context::with_context(|cx| {
            let active = if was_running {
                cx.scheduler.remove(self.id)
            } else {
                None
            };
            let pending = token.and_then(|token| cx.scheduler.cancel_start(token));
            (active, pending)
        })
    }

    fn set_target(&self, target: V) {
        let event = {
            let mut inner = self.inner.borrow_mut();
            let from = inner.target_value.clone();
            let changed = from != target;
            inner.apply_target(target.clone());
            (inner.state == AnimationState::Running && changed)
                .then_some(AnimationEvent::Retargeted { from, to: target })
        };
        if let Some(event) = event {
            tracing::trace!("{:?} ({}) retargeted", self.id, self.label());
            self.emit_event(event);
        }
    }

    /// End the current run; `natural` marks convergence rather than a stop call
    fn finish(&self, at: AnimationPosition, immediately: bool, natural: bool) {
        let coast_to = {
            let inner = self.inner.borrow();
            if !inner.run_active {
                return;
            }
            let coasts = !immediately
                && inner.state == AnimationState::Running
                && inner.kind.preserves_velocity();
            coasts.then(|| inner.rebuild(&inner.position(at)))
        };
        if let Some(position) = coast_to {
            self.inner.borrow_mut().decay_mode = DecayMode::Target;
            self.set_target(position);
            return;
        }

        let reached_end = natural || at == AnimationPosition::End;
        let (was_running, token, group, ended_at) = {
            let mut inner = self.inner.borrow_mut();
            let was_running = inner.state == AnimationState::Running;
            inner.state = AnimationState::Inactive;
            inner.run_active = false;
            inner.value = inner.position(at);
            if reached_end {
                inner.apply_pending_truncation();
            } else {
                let value = inner.delivered();
                inner.rest_at(value);
            }
            inner.velocity = AnimatableVector::zeros(inner.value.len());
            inner.fraction = 0.0;
            let token = inner.pending_start.take();
            (was_running, token, inner.group.take(), inner.delivered())
        };

        let removed = self.deregister(was_running, token);
        drop(removed);
        tracing::trace!(
            "{:?} ({}) {} at {:?}",
            self.id,
            self.label(),
            if natural { "finished" } else { "stopped" },
            at
        );

        self.emit_value();
        self.emit_event(AnimationEvent::Finished { at: ended_at });
        if let Some(group) = group {
            group::member_finished(group, self.id, reached_end);
        }
    }

    fn advance(&self, delta: f64) {
        let converged = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != AnimationState::Running {
                return;
            }
            inner.step(delta)
        };
        self.emit_value();
        if !converged {
            return;
        }

        let repeats = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != AnimationState::Running {
                // The value callback paused or stopped us
                return;
            }
            if inner.options.repeats {
                inner.begin_next_cycle();
            }
            inner.options.repeats
        };
        if !repeats {
            self.finish(AnimationPosition::Current, true, true);
        }
    }

    fn label(&self) -> &'static str {
        self.inner.borrow().label
    }
}

impl<V: Animatable> AnimationDriver for AnimationCell<V> {
    fn id(&self) -> AnimationId {
        self.id
    }

    fn priority(&self) -> i32 {
        self.inner.borrow().priority
    }

    fn is_running(&self) -> bool {
        self.inner.borrow().state == AnimationState::Running
    }

    fn update(&self, delta: f64) {
        self.advance(delta);
    }

    fn activate_delayed(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.pending_start.take().is_none() || !inner.run_active {
            return false;
        }
        inner.state = AnimationState::Running;
        true
    }

    fn interrupt(&self, immediately: bool) {
        self.finish(AnimationPosition::Current, immediately, false);
    }
}

// ============================================================================
// Public Handle
// ============================================================================

/// Shared handle to one property's animation state machine
pub struct PropertyAnimation<V: Animatable> {
    cell: Rc<AnimationCell<V>>,
}

impl<V: Animatable> Clone for PropertyAnimation<V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<V: Animatable + fmt::Debug> fmt::Debug for PropertyAnimation<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.cell.inner.borrow();
        f.debug_struct("PropertyAnimation")
            .field("id", &self.cell.id)
            .field("label", &inner.label)
            .field("state", &inner.state)
            .field("kind", &inner.kind)
            .field("value", &inner.delivered())
            .field("target", &inner.target_value)
            .finish()
    }
}

impl<V: Animatable> PropertyAnimation<V> {
    /// An inactive machine resting on `value`, using the thread's settings
    pub fn new(value: V) -> Self {
        let (tolerances, spring) = context::with_context(|cx| {
            (
                Tolerances::from(&cx.settings),
                cx.settings.default_spring,
            )
        });
        let vector = value.to_vector();
        let inner = AnimationInner {
            label: "",
            state: AnimationState::Inactive,
            run_active: false,
            velocity: AnimatableVector::zeros(vector.len()),
            target: vector.clone(),
            start: vector.clone(),
            value: vector,
            target_value: value,
            pending_len: None,
            kind: AnimationKind::Spring(spring),
            fraction: 0.0,
            decay_mode: DecayMode::Target,
            options: AnimationOptions::default(),
            delay: 0.0,
            pending_start: None,
            priority: 0,
            group: None,
            tolerances,
            on_value_changed: None,
            completion: None,
        };
        Self {
            cell: Rc::new(AnimationCell {
                id: AnimationId::next(),
                inner: RefCell::new(inner),
            }),
        }
    }

    pub fn id(&self) -> AnimationId {
        self.cell.id
    }

    pub fn label(&self) -> &'static str {
        self.cell.label()
    }

    /// Name shown in logs
    pub fn set_label(&self, label: &'static str) {
        self.cell.inner.borrow_mut().label = label;
    }

    pub fn state(&self) -> AnimationState {
        self.cell.inner.borrow().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == AnimationState::Running
    }

    /// A run is in progress: running, waiting on its delay, or paused
    pub fn is_active(&self) -> bool {
        self.cell.inner.borrow().run_active
    }

    /// Waiting for a delayed start
    pub fn is_pending(&self) -> bool {
        self.cell.inner.borrow().pending_start.is_some()
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.cell.inner.borrow().is_scheduled()
    }

    /// Current (presentation) value
    pub fn value(&self) -> V {
        self.cell.inner.borrow().delivered()
    }

    pub fn velocity(&self) -> V {
        let inner = self.cell.inner.borrow();
        inner.rebuild(&inner.velocity)
    }

    /// Velocity in component form
    pub fn velocity_vector(&self) -> AnimatableVector {
        self.cell.inner.borrow().velocity.clone()
    }

    pub fn target(&self) -> V {
        self.cell.inner.borrow().target_value.clone()
    }

    pub fn start_value(&self) -> V {
        let inner = self.cell.inner.borrow();
        inner.rebuild(&inner.start)
    }

    pub fn group(&self) -> Option<GroupId> {
        self.cell.inner.borrow().group
    }

    pub fn kind(&self) -> AnimationKind {
        self.cell.inner.borrow().kind
    }

    /// Switch models, keeping value and velocity
    ///
    /// A model with unusable parameters is replaced by the default of its
    /// family; see [`AnimationKind::sanitized`].
    pub fn set_kind(&self, kind: AnimationKind) {
        let kind = kind.sanitized();
        let mut inner = self.cell.inner.borrow_mut();
        if inner.kind != kind {
            inner.configure(kind);
        }
    }

    pub fn options(&self) -> AnimationOptions {
        self.cell.inner.borrow().options
    }

    pub fn set_options(&self, options: AnimationOptions) {
        self.cell.inner.borrow_mut().options = options;
    }

    pub fn priority(&self) -> i32 {
        self.cell.inner.borrow().priority
    }

    pub fn set_priority(&self, priority: i32) {
        self.cell.inner.borrow_mut().priority = priority;
    }

    /// Delay requested by the most recent start
    pub fn delay(&self) -> f64 {
        self.cell.inner.borrow().delay
    }

    /// Progress of an easing run in `[0, 1]`
    pub fn fraction_complete(&self) -> f64 {
        self.cell.inner.borrow().fraction
    }

    /// Jump to `value`
    ///
    /// A running machine keeps heading for its target from there; an idle one
    /// comes to rest on `value`.
    pub fn set_value(&self, value: V) {
        {
            let mut inner = self.cell.inner.borrow_mut();
            if inner.run_active {
                let len = inner.target.len();
                let padding = inner.tolerances.padding;
                inner.value = V::resize_vector(&value.to_vector(), len, padding);
                inner.start = inner.value.clone();
                inner.fraction = 0.0;
            } else {
                inner.rest_at(value);
            }
        }
        self.cell.emit_value();
    }

    /// Put an idle machine on `value` without notifying anyone
    pub(crate) fn rest_at(&self, value: V) {
        self.cell.inner.borrow_mut().rest_at(value);
    }

    /// Seed the velocity
    ///
    /// Decay machines switch to free flight: the value drifts along
    /// `velocity` and the target tracks where it will come to rest.
    pub fn set_velocity(&self, velocity: V) {
        let mut inner = self.cell.inner.borrow_mut();
        let len = inner.value.len();
        inner.velocity = velocity.to_vector().resized(len, 0.0);
        if let AnimationKind::Decay(config) = inner.kind {
            inner.decay_mode = DecayMode::Velocity;
            let target: AnimatableVector = inner
                .value
                .iter()
                .zip(inner.velocity.iter())
                .map(|(x, v)| x + config.resting_displacement(*v))
                .collect();
            inner.target_value = inner.rebuild(&target);
            inner.target = target;
        }
    }

    /// Move the target; a running machine retargets in place
    pub fn set_target(&self, target: V) {
        self.cell.set_target(target);
    }

    /// Called with every new value, including the final one
    pub fn set_on_value_changed(&self, callback: impl Fn(&V) + 'static) {
        self.cell.inner.borrow_mut().on_value_changed = Some(Rc::new(callback));
    }

    pub fn set_completion(&self, callback: impl Fn(AnimationEvent<V>) + 'static) {
        self.cell.inner.borrow_mut().completion = Some(Rc::new(callback));
    }

    /// Start running, immediately or after `after_delay` seconds
    ///
    /// No-op while already running. Starting again while a delayed start is
    /// pending replaces that start.
    pub fn start(&self, after_delay: f64) {
        self.cell.start(after_delay);
    }

    /// Leave the scheduler, keeping value, velocity and target
    pub fn pause(&self) {
        self.cell.pause();
    }

    /// Stop the current run
    ///
    /// With `immediately == false` a spring or decay coasts to the requested
    /// position instead of jumping there. No-op when no run is in progress.
    pub fn stop(&self, at: AnimationPosition, immediately: bool) {
        self.cell.finish(at, immediately, false);
    }

    /// Advance by `delta` seconds outside the scheduler
    pub fn update(&self, delta: f64) {
        self.cell.advance(delta);
    }

    /// Estimated seconds until the current run settles
    pub fn settling_duration(&self) -> f64 {
        let inner = self.cell.inner.borrow();
        match inner.kind {
            AnimationKind::Spring(config) => {
                let offset = &inner.value - &inner.target;
                let distance = offset.magnitude();
                let speed = if distance > 0.0 {
                    offset
                        .iter()
                        .zip(inner.velocity.iter())
                        .map(|(d, v)| d * v)
                        .sum::<f64>()
                        / distance
                } else {
                    inner.velocity.magnitude()
                };
                config.settling_duration(distance, speed, inner.tolerances.position_epsilon)
            }
            AnimationKind::Easing { duration, .. } => (1.0 - inner.fraction) * duration.max(0.0),
            AnimationKind::Decay(config) => config.duration(
                inner.velocity.magnitude(),
                inner.tolerances.decay_velocity_epsilon,
            ),
        }
    }

    pub fn downgrade(&self) -> WeakAnimation<V> {
        WeakAnimation {
            cell: Rc::downgrade(&self.cell),
        }
    }

    /// Join `group` for the coming run, leaving any group of an unfinished run
    pub(crate) fn join_group(&self, group: Option<GroupId>) {
        let (active, previous) = {
            let inner = self.cell.inner.borrow();
            (inner.run_active, inner.group)
        };
        if active && previous == group {
            return;
        }
        if let (true, Some(previous)) = (active, previous) {
            group::member_retargeted(previous, self.id());
        }
        self.cell.inner.borrow_mut().group = group;
        if let Some(group) = group {
            group::join(group, self.id());
        }
    }

    pub(crate) fn blocks_interaction(&self) -> bool {
        let inner = self.cell.inner.borrow();
        inner.run_active && inner.options.prevent_interaction
    }
}

/// Non-owning handle to a [`PropertyAnimation`]
pub struct WeakAnimation<V: Animatable> {
    cell: Weak<AnimationCell<V>>,
}

impl<V: Animatable> Clone for WeakAnimation<V> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<V: Animatable> WeakAnimation<V> {
    pub fn upgrade(&self) -> Option<PropertyAnimation<V>> {
        self.cell.upgrade().map(|cell| PropertyAnimation { cell })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FrameTick;
    use std::cell::RefCell;

    fn events<V: Animatable>(
        animation: &PropertyAnimation<V>,
    ) -> Rc<RefCell<Vec<AnimationEvent<V>>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        animation.set_completion(move |event| sink.borrow_mut().push(event));
        log
    }

    fn run_frames(frames: u64) {
        for frame in 1..=frames {
            crate::tick(FrameTick::at_rate(frame, 60.0));
        }
    }

    #[test]
    fn test_spring_runs_to_target() {
        let animation = PropertyAnimation::new(0.0_f64);
        let log = events(&animation);
        animation.set_kind(AnimationKind::Spring(SpringConfig::from_response(0.3, 1.0, 1.0)));
        animation.set_target(100.0);
        animation.start(0.0);
        assert!(animation.is_running());

        run_frames(240);
        assert!(!animation.is_running());
        assert_eq!(animation.value(), 100.0);
        assert_eq!(*log.borrow(), vec![AnimationEvent::Finished { at: 100.0 }]);
    }

    #[test]
    fn test_present_optional_lands_on_neutral_value() {
        let animation = PropertyAnimation::new(Some(5.0_f64));
        let log = events(&animation);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 0.5,
        });
        animation.set_target(Some(0.0));
        animation.start(0.0);
        animation.update(0.1);
        assert!(animation.value().is_some());

        animation.stop(AnimationPosition::End, true);
        assert_eq!(animation.value(), Some(0.0));
        assert_eq!(animation.value(), animation.target());
        assert_eq!(
            log.borrow().last(),
            Some(&AnimationEvent::Finished { at: Some(0.0) })
        );

        animation.set_target(None);
        animation.start(0.0);
        animation.update(0.6);
        assert!(!animation.is_active());
        assert_eq!(animation.value(), None);
    }

    #[test]
    fn test_rotation_retarget_takes_short_way_round() {
        let from = verve_core::Affine2D::rotation(170f64.to_radians());
        let to = verve_core::Affine2D::rotation(-170f64.to_radians());
        let animation = PropertyAnimation::new(from);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(to);
        animation.start(0.0);

        animation.update(0.5);
        let halfway = animation.value().decompose().rotation.abs();
        assert!((halfway - std::f64::consts::PI).abs() < 1e-6);

        animation.update(0.6);
        assert!(!animation.is_running());
        assert_eq!(animation.value(), to);
    }

    #[test]
    fn test_unusable_model_is_replaced() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Decay(DecayConfig {
            deceleration_rate: 1.0,
        }));
        assert_eq!(animation.kind(), AnimationKind::Decay(DecayConfig::NORMAL));

        animation.set_target(10.0);
        animation.start(0.0);
        animation.update(1.0 / 60.0);
        let value = animation.value();
        assert!(value.is_finite() && value > 0.0 && value < 10.0);
        animation.stop(AnimationPosition::End, true);

        animation.set_kind(AnimationKind::Spring(SpringConfig::new(100.0, 10.0, 0.0)));
        assert_eq!(animation.kind(), AnimationKind::Spring(SpringConfig::default()));
    }

    #[test]
    fn test_start_is_noop_while_running() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_target(1.0);
        animation.start(0.0);
        animation.update(0.05);
        let value = animation.value();
        animation.start(0.0);
        assert_eq!(animation.value(), value);
        assert!(animation.is_running());
        animation.stop(AnimationPosition::End, true);
    }

    #[test]
    fn test_spring_retarget_keeps_velocity() {
        let animation = PropertyAnimation::new(0.0_f64);
        let log = events(&animation);
        animation.set_target(100.0);
        animation.start(0.0);
        for _ in 0..6 {
            animation.update(1.0 / 60.0);
        }
        let before = animation.velocity();
        assert!(before > 0.0);

        animation.set_target(-50.0);
        assert_eq!(animation.velocity(), before);
        assert_eq!(
            log.borrow().last(),
            Some(&AnimationEvent::Retargeted {
                from: 100.0,
                to: -50.0
            })
        );
        animation.stop(AnimationPosition::Current, true);
    }

    #[test]
    fn test_reset_velocity_option() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_target(100.0);
        animation.start(0.0);
        animation.update(0.1);
        animation.set_options(AnimationOptions {
            reset_velocity: true,
            ..Default::default()
        });
        animation.set_target(0.0);
        assert_eq!(animation.velocity(), 0.0);
        animation.stop(AnimationPosition::Current, true);
    }

    #[test]
    fn test_stop_at_end_snaps_and_fires_once() {
        let animation = PropertyAnimation::new(0.0_f64);
        let log = events(&animation);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::EaseInOut,
            duration: 1.0,
        });
        animation.set_target(10.0);
        animation.start(0.0);
        animation.update(0.25);

        animation.stop(AnimationPosition::End, true);
        animation.stop(AnimationPosition::End, true);
        assert_eq!(animation.value(), 10.0);
        assert_eq!(animation.velocity(), 0.0);
        assert_eq!(*log.borrow(), vec![AnimationEvent::Finished { at: 10.0 }]);
    }

    #[test]
    fn test_stop_at_start_rests_there() {
        let animation = PropertyAnimation::new(2.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(4.0);
        animation.start(0.0);
        animation.update(0.5);
        animation.stop(AnimationPosition::Start, true);
        assert_eq!(animation.value(), 2.0);
        assert_eq!(animation.target(), 2.0);
    }

    #[test]
    fn test_coasting_stop_retargets() {
        let animation = PropertyAnimation::new(0.0_f64);
        let log = events(&animation);
        animation.set_target(100.0);
        animation.start(0.0);
        animation.update(0.05);
        let here = animation.value();

        animation.stop(AnimationPosition::Current, false);
        assert!(animation.is_running());
        assert_eq!(animation.target(), here);
        assert!(matches!(
            log.borrow().last(),
            Some(AnimationEvent::Retargeted { .. })
        ));
        animation.stop(AnimationPosition::Current, true);
    }

    #[test]
    fn test_linear_easing_midpoint() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(10.0);
        animation.start(0.0);
        for _ in 0..30 {
            animation.update(1.0 / 60.0);
        }
        assert!((animation.value() - 5.0).abs() < 10.0 / 60.0);
        assert!((animation.velocity() - 10.0).abs() < 1e-6);
        assert!((animation.fraction_complete() - 0.5).abs() < 1e-9);
        assert!((animation.settling_duration() - 0.5).abs() < 1e-9);
        animation.stop(AnimationPosition::End, true);
    }

    #[test]
    fn test_easing_retarget_restarts_curve() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(10.0);
        animation.start(0.0);
        animation.update(0.5);
        animation.set_target(20.0);
        assert_eq!(animation.fraction_complete(), 0.0);
        assert_eq!(animation.start_value(), 5.0);
        animation.update(0.5);
        assert!((animation.value() - 12.5).abs() < 1e-9);
        animation.stop(AnimationPosition::End, true);
    }

    #[test]
    fn test_decay_velocity_mode_drifts() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Decay(DecayConfig::NORMAL));
        animation.set_velocity(500.0);
        let rest = DecayConfig::NORMAL.resting_displacement(500.0);
        assert!((animation.target() - rest).abs() < 1e-9);
        animation.start(0.0);

        let mut previous = 0.0;
        while animation.is_running() {
            animation.update(1.0 / 60.0);
            assert!(animation.value() >= previous);
            previous = animation.value();
        }
        assert!((animation.value() - rest).abs() < 0.01);
    }

    #[test]
    fn test_decay_target_mode_lands_on_target() {
        let animation = PropertyAnimation::new(10.0_f64);
        animation.set_kind(AnimationKind::Decay(DecayConfig::FAST));
        animation.set_target(-30.0);
        assert!(animation.velocity() < 0.0);
        animation.start(0.0);
        for _ in 0..600 {
            animation.update(1.0 / 60.0);
        }
        assert!(!animation.is_running());
        assert_eq!(animation.value(), -30.0);
    }

    #[test]
    fn test_autoreverse_swaps_direction() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 0.5,
        });
        animation.set_options(AnimationOptions {
            repeats: true,
            autoreverses: true,
            ..Default::default()
        });
        animation.set_target(1.0);
        animation.start(0.0);
        animation.update(0.5);
        assert!(animation.is_running());
        assert_eq!(animation.target(), 0.0);
        animation.update(0.25);
        assert!((animation.value() - 0.5).abs() < 1e-9);
        animation.stop(AnimationPosition::Current, true);
        assert!(!animation.is_running());
    }

    #[test]
    fn test_integralize_rounds_delivered_values() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_options(AnimationOptions {
            integralize: true,
            ..Default::default()
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        animation.set_on_value_changed(move |value| sink.borrow_mut().push(*value));
        animation.set_target(10.0);
        animation.start(0.0);
        animation.update(0.33);
        animation.update(0.33);
        assert!(seen.borrow().iter().all(|value| value.fract() == 0.0));
        animation.stop(AnimationPosition::End, true);
    }

    #[test]
    fn test_pause_keeps_state() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_target(100.0);
        animation.start(0.0);
        animation.update(0.05);
        let (value, velocity) = (animation.value(), animation.velocity());

        animation.pause();
        assert!(!animation.is_running());
        assert!(animation.is_active());
        animation.update(0.05);
        assert_eq!(animation.value(), value);
        assert_eq!(animation.velocity(), velocity);

        animation.start(0.0);
        assert!(animation.is_running());
        animation.stop(AnimationPosition::End, true);
        assert!(!animation.is_active());
    }

    #[test]
    fn test_shrinking_collection_converges_then_truncates() {
        let animation = PropertyAnimation::new(vec![1.0_f64, 2.0, 3.0]);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(vec![5.0]);
        animation.start(0.0);
        animation.update(0.5);
        assert_eq!(animation.value(), vec![3.0, 1.0, 1.5]);
        animation.update(0.5);
        assert_eq!(animation.value(), vec![5.0]);
    }

    #[test]
    fn test_growing_collection_fades_in() {
        let animation = PropertyAnimation::new(vec![4.0_f64]);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 1.0,
        });
        animation.set_target(vec![4.0, 8.0]);
        animation.start(0.0);
        animation.update(0.25);
        assert_eq!(animation.value(), vec![4.0, 2.0]);
        animation.stop(AnimationPosition::End, true);
        assert_eq!(animation.value(), vec![4.0, 8.0]);
    }

    #[test]
    fn test_delayed_start_waits_for_ticks() {
        let animation = PropertyAnimation::new(0.0_f64);
        animation.set_kind(AnimationKind::Easing {
            curve: Easing::Linear,
            duration: 0.1,
        });
        animation.set_target(1.0);
        animation.start(0.04);
        assert!(animation.is_pending());
        assert!(!animation.is_running());

        run_frames(3);
        assert!(animation.is_running());
        assert_eq!(animation.value(), 0.0);
        animation.stop(AnimationPosition::Start, true);
        assert!(!animation.is_pending());
        assert_eq!(crate::active_animation_count(), 0);
    }
}
