//! Animatable properties and the property-access redirector
//!
//! A [`Property`] is a typed token for one field of a host type: a getter, a
//! setter, a process-unique [`PropertyKey`] and an update priority. Host
//! objects are wrapped in [`Animated`], which keeps one lazily created
//! [`PropertyAnimation`] per property.
//!
//! Writes go through an [`Animator`]. Outside an animation block (or inside a
//! non-animated one) a write stops any running animation and lands on the
//! object at once. Inside an animated block it installs a new target and
//! starts the machine, which then pushes every frame's value back into the
//! object through the setter.
//!
//! ```ignore
//! struct Card { opacity: f64 }
//!
//! animatable_property!(pub fn opacity(Card => f64) = opacity);
//!
//! let card = Animated::new(Card { opacity: 0.0 });
//! animate().gentle().run(|| card.animator().set(opacity(), 1.0));
//! ```

use crate::animation::{AnimationKind, AnimationPosition, PropertyAnimation};
use crate::scope::{self, AnimationFrame, FrameIntent};
use crate::values::Animatable;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Property Tokens
// ============================================================================

/// Process-unique identity of a declared property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey(u32);

impl PropertyKey {
    fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Typed accessor pair for one animatable field of `O`
pub struct Property<O, V> {
    key: PropertyKey,
    name: &'static str,
    getter: fn(&O) -> V,
    setter: fn(&mut O, V),
    priority: i32,
    _marker: PhantomData<fn() -> (O, V)>,
}

impl<O, V> Property<O, V> {
    /// Declare a property; every call allocates a new key
    pub fn new(name: &'static str, getter: fn(&O) -> V, setter: fn(&mut O, V)) -> Self {
        Self {
            key: PropertyKey::next(),
            name,
            getter,
            setter,
            priority: 0,
            _marker: PhantomData,
        }
    }

    /// Animations of higher-priority properties are advanced first each tick
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn key(&self) -> PropertyKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Read the stored value, bypassing animations
    pub fn get(&self, object: &O) -> V {
        (self.getter)(object)
    }

    /// Write the stored value, bypassing animations
    pub fn set(&self, object: &mut O, value: V) {
        (self.setter)(object, value)
    }
}

impl<O, V> fmt::Debug for Property<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Declare a `'static` [`Property`] accessor for a plain field
///
/// ```ignore
/// animatable_property!(pub fn frame(View => Rect) = frame);
/// animatable_property!(pub fn alpha(View => f64) = alpha, priority = 10);
/// ```
#[macro_export]
macro_rules! animatable_property {
    ($vis:vis fn $name:ident($owner:ty => $value:ty) = $field:ident $(, priority = $priority:expr)?) => {
        $vis fn $name() -> &'static $crate::Property<$owner, $value> {
            static PROPERTY: ::std::sync::OnceLock<$crate::Property<$owner, $value>> =
                ::std::sync::OnceLock::new();
            PROPERTY.get_or_init(|| {
                $crate::Property::new(
                    stringify!($name),
                    |object: &$owner| ::std::clone::Clone::clone(&object.$field),
                    |object: &mut $owner, value: $value| object.$field = value,
                )
                $(.with_priority($priority))?
            })
        }
    };
}

// ============================================================================
// Animated Objects
// ============================================================================

trait ErasedAnimation {
    fn as_any(&self) -> &dyn Any;
    fn blocks_interaction(&self) -> bool;
    fn stop_now(&self);
}

impl<V: Animatable> ErasedAnimation for PropertyAnimation<V> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn blocks_interaction(&self) -> bool {
        PropertyAnimation::blocks_interaction(self)
    }

    fn stop_now(&self) {
        self.stop(AnimationPosition::Current, true);
    }
}

type LinkFn<V> = Rc<dyn Fn(&V)>;

struct AnimatedInner<O> {
    object: RefCell<O>,
    animations: RefCell<FxHashMap<PropertyKey, Rc<dyn ErasedAnimation>>>,
    /// Per source property: `LinkFn<V>` forwarders, type-erased
    links: RefCell<FxHashMap<PropertyKey, Vec<Rc<dyn Any>>>>,
}

/// Host object whose properties can be animated
///
/// Cloning shares the object. Animations only hold weak references back to
/// it; once the last handle is dropped they stop on their next frame.
pub struct Animated<O: 'static> {
    inner: Rc<AnimatedInner<O>>,
}

impl<O: 'static> Clone for Animated<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O: fmt::Debug + 'static> fmt::Debug for Animated<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animated")
            .field("object", &self.inner.object)
            .field("animations", &self.inner.animations.borrow().len())
            .finish()
    }
}

impl<O: 'static> Animated<O> {
    pub fn new(object: O) -> Self {
        Self {
            inner: Rc::new(AnimatedInner {
                object: RefCell::new(object),
                animations: RefCell::default(),
                links: RefCell::default(),
            }),
        }
    }

    /// The stored object, as last written by animations or direct writes
    pub fn borrow(&self) -> Ref<'_, O> {
        self.inner.object.borrow()
    }

    /// Mutable access that bypasses animations entirely
    pub fn borrow_mut(&self) -> RefMut<'_, O> {
        self.inner.object.borrow_mut()
    }

    /// Animation-aware accessor for this object's properties
    pub fn animator(&self) -> Animator<'_, O> {
        Animator { target: self }
    }

    /// Whether a run started with `prevent_interaction` is still going
    pub fn is_interaction_blocked(&self) -> bool {
        self.inner
            .animations
            .borrow()
            .values()
            .any(|animation| animation.blocks_interaction())
    }

    /// Forward every animator write of `source` to `dependent_property` on
    /// `dependent`, mapped through `map`
    ///
    /// The forwarded write happens in the same animation block, so both
    /// properties animate together. Links must not form cycles.
    pub fn link<V, P, W>(
        &self,
        source: &Property<O, V>,
        dependent: &Animated<P>,
        dependent_property: &'static Property<P, W>,
        map: impl Fn(&V) -> W + 'static,
    ) where
        V: Animatable,
        P: 'static,
        W: Animatable,
    {
        let dependent = Rc::downgrade(&dependent.inner);
        let forward: LinkFn<V> = Rc::new(move |value: &V| {
            if let Some(inner) = dependent.upgrade() {
                Animated { inner }.animator().set(dependent_property, map(value));
            }
        });
        self.inner
            .links
            .borrow_mut()
            .entry(source.key())
            .or_default()
            .push(Rc::new(forward));
    }

    pub fn downgrade(&self) -> WeakAnimated<O> {
        WeakAnimated {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn read<V>(&self, property: &Property<O, V>) -> V {
        property.get(&self.inner.object.borrow())
    }

    fn write<V>(&self, property: &Property<O, V>, value: V) {
        match self.inner.object.try_borrow_mut() {
            Ok(mut object) => property.set(&mut object, value),
            Err(_) => tracing::warn!(
                "write to `{}` dropped: object is already borrowed",
                property.name()
            ),
        }
    }

    fn animation_for<V: Animatable>(
        &self,
        property: &Property<O, V>,
    ) -> Option<PropertyAnimation<V>> {
        self.inner
            .animations
            .borrow()
            .get(&property.key())
            .and_then(|animation| animation.as_any().downcast_ref::<PropertyAnimation<V>>())
            .cloned()
    }

    fn create_animation<V: Animatable>(
        &self,
        property: &Property<O, V>,
    ) -> PropertyAnimation<V> {
        let animation = PropertyAnimation::new(self.read(property));
        animation.set_label(property.name());
        animation.set_priority(property.priority());

        let owner = Rc::downgrade(&self.inner);
        let machine = animation.downgrade();
        let setter = property.setter;
        let name = property.name();
        animation.set_on_value_changed(move |value: &V| match owner.upgrade() {
            Some(owner) => match owner.object.try_borrow_mut() {
                Ok(mut object) => setter(&mut object, value.clone()),
                Err(_) => tracing::warn!("frame for `{name}` skipped: object is borrowed"),
            },
            None => {
                tracing::debug!("owner of `{name}` dropped, stopping its animation");
                if let Some(machine) = machine.upgrade() {
                    machine.stop(AnimationPosition::Current, true);
                }
            }
        });

        self.inner
            .animations
            .borrow_mut()
            .insert(property.key(), Rc::new(animation.clone()));
        tracing::trace!("created animation for `{}`", property.name());
        animation
    }

    fn animation_or_create<V: Animatable>(
        &self,
        property: &Property<O, V>,
    ) -> PropertyAnimation<V> {
        match self.animation_for(property) {
            Some(animation) => animation,
            None => self.create_animation(property),
        }
    }

    fn forward_links<V: Animatable>(&self, key: PropertyKey, value: &V) {
        let forwards: Vec<LinkFn<V>> = self
            .inner
            .links
            .borrow()
            .get(&key)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| link.downcast_ref::<LinkFn<V>>().cloned())
                    .collect()
            })
            .unwrap_or_default();
        for forward in forwards {
            forward(value);
        }
    }
}

/// Non-owning handle to an [`Animated`] object
pub struct WeakAnimated<O: 'static> {
    inner: Weak<AnimatedInner<O>>,
}

impl<O: 'static> Clone for WeakAnimated<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O: 'static> WeakAnimated<O> {
    pub fn upgrade(&self) -> Option<Animated<O>> {
        self.inner.upgrade().map(|inner| Animated { inner })
    }
}

// ============================================================================
// Animator
// ============================================================================

/// Animation-aware property access for one [`Animated`] object
pub struct Animator<'a, O: 'static> {
    target: &'a Animated<O>,
}

impl<O: 'static> Animator<'_, O> {
    /// Read a property
    ///
    /// While an animation runs this returns its target, so code in a block
    /// sees the values it just wrote. Inside a velocity or live-value query
    /// it returns the animation's velocity or presentation value instead.
    pub fn get<V: Animatable>(&self, property: &Property<O, V>) -> V {
        let intent = scope::current_intent();
        if let Some(animation) = self.target.animation_for(property) {
            match intent {
                FrameIntent::ReadVelocity => return animation.velocity(),
                FrameIntent::ReadLiveValue if animation.is_active() => return animation.value(),
                FrameIntent::Write if animation.is_active() => return animation.target(),
                _ => {}
            }
        } else if intent == FrameIntent::ReadVelocity {
            return V::zero();
        }
        self.target.read(property)
    }

    /// Write a property, animating according to the current block
    pub fn set<V: Animatable>(&self, property: &Property<O, V>, value: V) {
        let frame = scope::current_frame();
        match frame {
            Some(frame) if frame.intent() != FrameIntent::Write => {
                tracing::warn!("`{}` written inside an animation query", property.name());
                self.write_through(property, value.clone());
            }
            Some(frame) => match frame.kind {
                Some(kind) => self.animate_to(property, value.clone(), &frame, kind),
                None => self.write_through(property, value.clone()),
            },
            None => self.write_through(property, value.clone()),
        }
        self.target.forward_links(property.key(), &value);
    }

    /// Seed the property's velocity and start its animation
    ///
    /// Inside a block the block's model is used; a decay model turns this
    /// into a fling that comes to rest wherever the velocity carries it.
    pub fn set_velocity<V: Animatable>(&self, property: &Property<O, V>, velocity: V) {
        let frame = scope::current_frame().filter(|frame| frame.intent() == FrameIntent::Write);
        let animation = self.target.animation_or_create(property);
        if !animation.is_active() {
            animation.rest_at(self.target.read(property));
        }
        let delay = match frame {
            Some(frame) => {
                if let Some(kind) = frame.kind {
                    animation.set_options(frame.options);
                    animation.set_kind(kind);
                    animation.join_group(frame.group());
                }
                frame.delay
            }
            None => 0.0,
        };
        animation.set_velocity(velocity);
        animation.start(delay);
    }

    /// The property's animation, if one was ever created
    pub fn animation<V: Animatable>(
        &self,
        property: &Property<O, V>,
    ) -> Option<PropertyAnimation<V>> {
        self.target.animation_for(property)
    }

    /// Velocity of the property's animation; its last velocity when idle
    pub fn animation_velocity<V: Animatable>(&self, property: &Property<O, V>) -> Option<V> {
        self.target.animation_for(property)?;
        Some(scope::with_query_frame(FrameIntent::ReadVelocity, || {
            self.get(property)
        }))
    }

    /// In-flight value of a running animation
    pub fn animation_value<V: Animatable>(&self, property: &Property<O, V>) -> Option<V> {
        if !self.is_animating(property) {
            return None;
        }
        Some(scope::with_query_frame(FrameIntent::ReadLiveValue, || {
            self.get(property)
        }))
    }

    pub fn is_animating<V: Animatable>(&self, property: &Property<O, V>) -> bool {
        self.target
            .animation_for(property)
            .is_some_and(|animation| animation.is_active())
    }

    /// Stop the property's animation
    pub fn stop<V: Animatable>(
        &self,
        property: &Property<O, V>,
        at: AnimationPosition,
        immediately: bool,
    ) {
        if let Some(animation) = self.target.animation_for(property) {
            animation.stop(at, immediately);
        }
    }

    /// Stop every animation on this object where it stands
    pub fn stop_all(&self) {
        let animations: Vec<Rc<dyn ErasedAnimation>> =
            self.target.inner.animations.borrow().values().cloned().collect();
        for animation in animations {
            animation.stop_now();
        }
    }

    fn write_through<V: Animatable>(&self, property: &Property<O, V>, value: V) {
        if let Some(animation) = self.target.animation_for(property) {
            if animation.is_active() {
                animation.stop(AnimationPosition::Current, true);
            }
            animation.rest_at(value.clone());
        }
        self.target.write(property, value);
    }

    fn animate_to<V: Animatable>(
        &self,
        property: &Property<O, V>,
        value: V,
        frame: &AnimationFrame,
        kind: AnimationKind,
    ) {
        let existing = self.target.animation_for(property);
        if let Some(animation) = &existing {
            if animation.is_scheduled() && animation.target() == value && animation.kind() == kind
            {
                tracing::trace!("`{}` already animating to this value", property.name());
                return;
            }
        }

        let animation = match existing {
            Some(animation) => animation,
            None => self.target.create_animation(property),
        };
        if !animation.is_active() {
            let current = self.target.read(property);
            if current == value {
                return;
            }
            animation.rest_at(current);
        }

        animation.set_options(frame.options);
        animation.set_kind(kind);
        animation.join_group(frame.group());
        animation.set_target(value);
        animation.start(frame.delay);
    }
}
