//! Animation blocks and the configuration scope stack
//!
//! `animate().gentle().run(|| ...)` pushes an [`AnimationFrame`] for the
//! duration of the closure. Property writes made through an
//! [`Animator`](crate::Animator) consult the top frame to decide whether to
//! animate, and with which model. Blocks nest; the innermost frame wins.
//!
//! Each block opens a completion group. The group is sealed when the block
//! body returns and fires its completion once every animation started in
//! the block has finished or been taken over by a later block.

use crate::animation::{AnimationKind, AnimationOptions};
use crate::context::{self, with_context};
use crate::decay::DecayConfig;
use crate::easing::Easing;
use crate::group::{GroupCallback, GroupCompletion, GroupId};
use crate::spring::SpringConfig;

/// Easing duration used when only a curve is given
pub const DEFAULT_EASING_DURATION: f64 = 0.25;

/// What a read inside the current frame should return
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum FrameIntent {
    /// Ordinary block: reads see targets, writes animate
    #[default]
    Write,
    /// Reads return the velocity of the running animation
    ReadVelocity,
    /// Reads return the in-flight presentation value
    ReadLiveValue,
}

/// Configuration pushed by an animation block
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnimationFrame {
    /// Model for writes in this block; `None` writes without animating
    pub kind: Option<AnimationKind>,
    /// Seconds before animations started by this block begin
    pub delay: f64,
    pub options: AnimationOptions,
    group: Option<GroupId>,
    intent: FrameIntent,
}

impl AnimationFrame {
    pub fn animated(kind: AnimationKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn non_animated() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_options(mut self, options: AnimationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_animated(&self) -> bool {
        self.kind.is_some()
    }

    /// Completion group of the block that pushed this frame
    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub(crate) fn intent(&self) -> FrameIntent {
        self.intent
    }

    fn query(intent: FrameIntent) -> Self {
        Self {
            intent,
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub(crate) struct ScopeStack {
    frames: Vec<AnimationFrame>,
}

impl ScopeStack {
    fn push(&mut self, frame: AnimationFrame) {
        self.frames.push(frame);
    }

    fn pop(&mut self) -> Option<AnimationFrame> {
        self.frames.pop()
    }

    fn top(&self) -> Option<AnimationFrame> {
        self.frames.last().copied()
    }
}

/// Pops the block's frame and seals its group, even if the body panics
struct BlockGuard {
    group: Option<GroupId>,
}

impl Drop for BlockGuard {
    fn drop(&mut self) {
        let group = self.group;
        let ready = context::try_with_context(|cx| {
            cx.scopes.pop();
            group.and_then(|group| cx.groups.seal(group))
        })
        .flatten();
        if let Some(ready) = ready {
            if !std::thread::panicking() {
                ready.fire();
            }
        }
    }
}

fn run_block<R>(
    mut frame: AnimationFrame,
    body: impl FnOnce() -> R,
    completion: Option<GroupCallback>,
) -> R {
    let group = with_context(|cx| {
        let group = cx.groups.open(completion);
        frame.group = Some(group);
        cx.scopes.push(frame);
        group
    });
    tracing::trace!("animation block opened ({:?}, {:?})", group, frame.kind);
    let _guard = BlockGuard { group: Some(group) };
    body()
}

/// Run `body` with `frame` as the current animation configuration
///
/// `completion` fires once, after `body` has returned and every animation it
/// started has finished or been retargeted by another block.
pub fn run_animation_block<R>(
    frame: AnimationFrame,
    body: impl FnOnce() -> R,
    completion: impl FnOnce(GroupCompletion) + 'static,
) -> R {
    run_block(frame, body, Some(Box::new(completion)))
}

/// Run `body` with animations disabled; writes land immediately
pub fn without_animation<R>(body: impl FnOnce() -> R) -> R {
    run_block(AnimationFrame::non_animated(), body, None)
}

/// The innermost frame, if any block is running
pub fn current_frame() -> Option<AnimationFrame> {
    with_context(|cx| cx.scopes.top())
}

pub(crate) fn current_intent() -> FrameIntent {
    current_frame().map(|frame| frame.intent()).unwrap_or_default()
}

/// Run `f` under a marker frame that redirects reads
pub(crate) fn with_query_frame<R>(intent: FrameIntent, f: impl FnOnce() -> R) -> R {
    with_context(|cx| cx.scopes.push(AnimationFrame::query(intent)));
    let _guard = BlockGuard { group: None };
    f()
}

// ============================================================================
// Builder
// ============================================================================

/// Start describing an animation block
///
/// ```ignore
/// animate().gentle().with_delay(0.1).run(|| {
///     card.animator().set(opacity(), 1.0);
/// });
/// ```
pub fn animate() -> Animate {
    Animate::default()
}

/// Builder for an animation block
#[derive(Clone, Copy, Debug, Default)]
#[must_use = "an animation block does nothing until `run` is called"]
pub struct Animate {
    spring: Option<SpringConfig>,
    easing: Option<Easing>,
    duration: Option<f64>,
    decay: Option<DecayConfig>,
    non_animated: bool,
    delay: f64,
    options: AnimationOptions,
}

impl Animate {
    /// Use spring physics with the given configuration
    pub fn with_spring(mut self, config: SpringConfig) -> Self {
        self.spring = Some(config);
        self.easing = None;
        self.duration = None;
        self.decay = None;
        self
    }

    /// Use a gentle spring (good for page transitions)
    pub fn gentle(self) -> Self {
        self.with_spring(SpringConfig::gentle())
    }

    /// Use a wobbly spring (good for playful UI)
    pub fn wobbly(self) -> Self {
        self.with_spring(SpringConfig::wobbly())
    }

    /// Use a stiff spring (good for buttons)
    pub fn stiff(self) -> Self {
        self.with_spring(SpringConfig::stiff())
    }

    /// Use a snappy spring (good for quick responses)
    pub fn snappy(self) -> Self {
        self.with_spring(SpringConfig::snappy())
    }

    /// Use a timing curve
    pub fn with_easing(mut self, curve: Easing) -> Self {
        self.easing = Some(curve);
        self.decay = None;
        self
    }

    /// Use a timing curve lasting `seconds`
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self.decay = None;
        self
    }

    /// Use momentum decay
    pub fn with_decay(mut self, config: DecayConfig) -> Self {
        self.decay = Some(config);
        self
    }

    /// Write values immediately instead of animating
    pub fn non_animated(mut self) -> Self {
        self.non_animated = true;
        self
    }

    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.delay = seconds;
        self
    }

    pub fn with_options(mut self, options: AnimationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn repeats(mut self) -> Self {
        self.options.repeats = true;
        self
    }

    pub fn autoreverses(mut self) -> Self {
        self.options.repeats = true;
        self.options.autoreverses = true;
        self
    }

    pub fn integralize(mut self) -> Self {
        self.options.integralize = true;
        self
    }

    pub fn reset_velocity(mut self) -> Self {
        self.options.reset_velocity = true;
        self
    }

    pub fn prevent_interaction(mut self) -> Self {
        self.options.prevent_interaction = true;
        self
    }

    /// The frame this builder pushes
    ///
    /// Models with unusable parameters fall back to their family's default.
    pub fn frame(&self) -> AnimationFrame {
        let kind = if self.non_animated {
            None
        } else if let Some(config) = self.decay {
            Some(AnimationKind::Decay(config))
        } else if self.easing.is_some() || self.duration.is_some() {
            Some(AnimationKind::Easing {
                curve: self.easing.unwrap_or(Easing::EaseInOut),
                duration: self.duration.unwrap_or(DEFAULT_EASING_DURATION),
            })
        } else {
            let config = match self.spring {
                Some(config) => config,
                None => context::settings().default_spring,
            };
            Some(AnimationKind::Spring(config))
        };
        AnimationFrame {
            kind: kind.map(AnimationKind::sanitized),
            delay: self.delay,
            options: self.options,
            group: None,
            intent: FrameIntent::Write,
        }
    }

    pub fn run<R>(self, body: impl FnOnce() -> R) -> R {
        run_block(self.frame(), body, None)
    }

    pub fn run_with_completion<R>(
        self,
        body: impl FnOnce() -> R,
        completion: impl FnOnce(GroupCompletion) + 'static,
    ) -> R {
        run_animation_block(self.frame(), body, completion)
    }
}
