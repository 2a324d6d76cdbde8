//! Animatable value types
//!
//! Every animatable type maps to a flat vector of `f64` components. The
//! physics models and easing curves only ever see those vectors, so adding a
//! new animatable type means implementing [`Animatable`] and nothing else.
//!
//! A few decompositions cannot tell values apart (an absent optional and its
//! neutral value, the hue of a fully transparent color). Those are rebuilt
//! with [`Animatable::from_vector_like`], which takes the missing part from a
//! value of the same shape, normally the animation target.
//!
//! Composite values decompose into components that interpolate well: colors
//! travel in premultiplied space, transforms in translation / scale / rotation
//! / shear components, optional values through their neutral element and
//! collections as the concatenation of their elements.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::f64::consts::TAU;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, Neg, Sub, SubAssign};
use verve_core::{
    Affine2D, Color, DecomposedAffine, DecomposedTransform, Point, Rect, Size, Transform3D, Vec3,
};

/// Squared distance below which an optional value reads back as absent
const NEUTRAL_EPSILON_SQUARED: f64 = 1e-18;

/// Index of the rotation angle in an [`Affine2D`] vector
const AFFINE_ROTATION: usize = 4;

// ============================================================================
// Component Vector
// ============================================================================

/// Flat vector of `f64` components
///
/// Arithmetic between vectors of different lengths treats missing trailing
/// components as zero and yields the longer length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimatableVector(SmallVec<[f64; 8]>);

impl AnimatableVector {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn zeros(len: usize) -> Self {
        Self(SmallVec::from_elem(0.0, len))
    }

    pub fn from_slice(components: &[f64]) -> Self {
        Self(SmallVec::from_slice(components))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.0.iter()
    }

    /// Component `index`, or zero past the end
    pub fn component(&self, index: usize) -> f64 {
        self.0.get(index).copied().unwrap_or(0.0)
    }

    pub fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    pub fn extend_from_slice(&mut self, components: &[f64]) {
        self.0.extend_from_slice(components);
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn magnitude_squared(&self) -> f64 {
        self.0.iter().map(|c| c * c).sum()
    }

    pub fn magnitude(&self) -> f64 {
        self.magnitude_squared().sqrt()
    }

    pub fn scaled(&self, factor: f64) -> Self {
        self.0.iter().map(|c| c * factor).collect()
    }

    /// Every component rounded to the nearest integer
    pub fn rounded(&self) -> Self {
        self.0.iter().map(|c| c.round()).collect()
    }

    /// Truncate or pad with `fill` to exactly `len` components
    pub fn resized(&self, len: usize, fill: f64) -> Self {
        let mut out = self.clone();
        out.0.resize(len, fill);
        out
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|c| c.is_finite())
    }

    fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let len = self.len().max(other.len());
        (0..len)
            .map(|i| f(self.component(i), other.component(i)))
            .collect()
    }
}

impl FromIterator<f64> for AnimatableVector {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Index<usize> for AnimatableVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for AnimatableVector {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl Add for &AnimatableVector {
    type Output = AnimatableVector;

    fn add(self, rhs: &AnimatableVector) -> AnimatableVector {
        self.zip_with(rhs, |a, b| a + b)
    }
}

impl Sub for &AnimatableVector {
    type Output = AnimatableVector;

    fn sub(self, rhs: &AnimatableVector) -> AnimatableVector {
        self.zip_with(rhs, |a, b| a - b)
    }
}

impl Add for AnimatableVector {
    type Output = AnimatableVector;

    fn add(self, rhs: AnimatableVector) -> AnimatableVector {
        &self + &rhs
    }
}

impl Sub for AnimatableVector {
    type Output = AnimatableVector;

    fn sub(self, rhs: AnimatableVector) -> AnimatableVector {
        &self - &rhs
    }
}

impl AddAssign<&AnimatableVector> for AnimatableVector {
    fn add_assign(&mut self, rhs: &AnimatableVector) {
        *self = &*self + rhs;
    }
}

impl SubAssign<&AnimatableVector> for AnimatableVector {
    fn sub_assign(&mut self, rhs: &AnimatableVector) {
        *self = &*self - rhs;
    }
}

impl Mul<f64> for &AnimatableVector {
    type Output = AnimatableVector;

    fn mul(self, rhs: f64) -> AnimatableVector {
        self.scaled(rhs)
    }
}

impl Mul<f64> for AnimatableVector {
    type Output = AnimatableVector;

    fn mul(self, rhs: f64) -> AnimatableVector {
        self.scaled(rhs)
    }
}

impl Neg for AnimatableVector {
    type Output = AnimatableVector;

    fn neg(self) -> AnimatableVector {
        self.scaled(-1.0)
    }
}

// ============================================================================
// Collection Padding
// ============================================================================

/// How collections of different lengths are reconciled mid-animation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionPadding {
    /// Added elements start from, and removed elements converge to, the
    /// element type's neutral value
    #[default]
    Neutral,
    /// Added and removed elements use the last shared element
    RepeatLast,
    /// Removed elements are dropped at once; added elements appear at their
    /// target
    Truncate,
}

// ============================================================================
// Animatable Trait
// ============================================================================

/// A value that can be decomposed into components and rebuilt from them
pub trait Animatable: Clone + PartialEq + 'static {
    /// Components of this value
    fn to_vector(&self) -> AnimatableVector;

    /// Rebuild a value from components produced by [`Animatable::to_vector`]
    /// (or interpolated between two such vectors)
    fn from_vector(vector: &AnimatableVector) -> Self;

    /// Rebuild a value, taking whatever the components cannot express from
    /// `like`
    ///
    /// `T::from_vector_like(&value.to_vector(), &value)` gives back `value`
    /// for every type, within floating-point tolerance.
    fn from_vector_like(vector: &AnimatableVector, _like: &Self) -> Self {
        Self::from_vector(vector)
    }

    /// Rewrite `vector` into the equivalent form nearest `reference`
    ///
    /// Applied to new targets against the current value so periodic
    /// components such as angles take the short way round.
    fn align_vector(_vector: &mut AnimatableVector, _reference: &AnimatableVector) {}

    /// The neutral value: absent optionals, new collection elements and
    /// fresh velocities start here
    fn zero() -> Self;

    /// Bring `vector` to exactly `len` components
    ///
    /// Scalar-like types pad with zeros; collections override this to pad
    /// whole elements according to `padding`.
    fn resize_vector(
        vector: &AnimatableVector,
        len: usize,
        padding: CollectionPadding,
    ) -> AnimatableVector {
        let fill = match padding {
            CollectionPadding::RepeatLast => vector.as_slice().last().copied().unwrap_or(0.0),
            CollectionPadding::Neutral | CollectionPadding::Truncate => 0.0,
        };
        vector.resized(len, fill)
    }

    /// Linearly interpolate between self and other by factor t
    fn lerp(&self, other: &Self, t: f64) -> Self {
        let a = self.to_vector();
        let b = other.to_vector();
        Self::from_vector(&(&a + &(&(&b - &a) * t)))
    }
}

// ============================================================================
// Scalars
// ============================================================================

impl Animatable for f64 {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[*self])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        vector.component(0)
    }

    fn zero() -> Self {
        0.0
    }
}

impl Animatable for f32 {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[*self as f64])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        vector.component(0) as f32
    }

    fn zero() -> Self {
        0.0
    }
}

// ============================================================================
// Geometry
// ============================================================================

impl Animatable for Point {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[self.x, self.y])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        Point::new(vector.component(0), vector.component(1))
    }

    fn zero() -> Self {
        Point::ZERO
    }
}

impl Animatable for Size {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[self.width, self.height])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        Size::new(vector.component(0), vector.component(1))
    }

    fn zero() -> Self {
        Size::ZERO
    }
}

impl Animatable for Rect {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[
            self.origin.x,
            self.origin.y,
            self.size.width,
            self.size.height,
        ])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        Rect::new(
            vector.component(0),
            vector.component(1),
            vector.component(2),
            vector.component(3),
        )
    }

    fn zero() -> Self {
        Rect::ZERO
    }
}

impl Animatable for Vec3 {
    fn to_vector(&self) -> AnimatableVector {
        AnimatableVector::from_slice(&[self.x, self.y, self.z])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        Vec3::new(vector.component(0), vector.component(1), vector.component(2))
    }

    fn zero() -> Self {
        Vec3::ZERO
    }
}

// ============================================================================
// Transforms
// ============================================================================

impl Animatable for Affine2D {
    fn to_vector(&self) -> AnimatableVector {
        let parts = self.decompose();
        AnimatableVector::from_slice(&[
            parts.translation[0],
            parts.translation[1],
            parts.scale[0],
            parts.scale[1],
            parts.rotation,
            parts.shear,
        ])
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        let c = |i| vector.component(i);
        Affine2D::recompose(&DecomposedAffine {
            translation: [c(0), c(1)],
            scale: [c(2), c(3)],
            rotation: c(4),
            shear: c(5),
        })
    }

    fn align_vector(vector: &mut AnimatableVector, reference: &AnimatableVector) {
        if vector.len() <= AFFINE_ROTATION || reference.len() <= AFFINE_ROTATION {
            return;
        }
        let turns = ((reference[AFFINE_ROTATION] - vector[AFFINE_ROTATION]) / TAU).round();
        vector[AFFINE_ROTATION] += turns * TAU;
    }

    fn zero() -> Self {
        Affine2D::IDENTITY
    }
}

impl Animatable for Transform3D {
    fn to_vector(&self) -> AnimatableVector {
        let parts = self.decompose();
        let mut v = AnimatableVector::new();
        v.extend_from_slice(&parts.translation);
        v.extend_from_slice(&parts.scale);
        v.extend_from_slice(&parts.skew);
        v.extend_from_slice(&parts.quaternion);
        v.extend_from_slice(&parts.perspective);
        v
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        let c = |i| vector.component(i);
        Transform3D::recompose(&DecomposedTransform {
            translation: [c(0), c(1), c(2)],
            scale: [c(3), c(4), c(5)],
            skew: [c(6), c(7), c(8)],
            quaternion: [c(9), c(10), c(11), c(12)],
            perspective: [c(13), c(14), c(15), c(16)],
        })
    }

    fn zero() -> Self {
        Transform3D::IDENTITY
    }
}

// ============================================================================
// Color
// ============================================================================

impl Animatable for Color {
    fn to_vector(&self) -> AnimatableVector {
        self.premultiplied().iter().map(|&c| c as f64).collect()
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        let c = |i| vector.component(i) as f32;
        Color::from_premultiplied([c(0), c(1), c(2), c(3)])
    }

    /// Fully transparent components keep the hue of `like`
    fn from_vector_like(vector: &AnimatableVector, like: &Self) -> Self {
        let color = Self::from_vector(vector);
        if color.a <= 0.0 {
            like.with_alpha(0.0)
        } else {
            color
        }
    }

    fn zero() -> Self {
        Color::TRANSPARENT
    }
}

// ============================================================================
// Optionals and Collections
// ============================================================================

/// Absent values animate through `T::zero()`: animating `None` to `Some(x)`
/// starts from the neutral value. Without a shape to follow, components on
/// the neutral value read back as `None`; [`Animatable::from_vector_like`]
/// keeps `Some` whenever `like` is present.
impl<T: Animatable> Animatable for Option<T> {
    fn to_vector(&self) -> AnimatableVector {
        match self {
            Some(value) => value.to_vector(),
            None => T::zero().to_vector(),
        }
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        let neutral = T::zero().to_vector();
        if (vector - &neutral).magnitude_squared() < NEUTRAL_EPSILON_SQUARED {
            None
        } else {
            Some(T::from_vector(vector))
        }
    }

    fn from_vector_like(vector: &AnimatableVector, like: &Self) -> Self {
        match like {
            Some(like) => Some(T::from_vector_like(vector, like)),
            None => Self::from_vector(vector),
        }
    }

    fn align_vector(vector: &mut AnimatableVector, reference: &AnimatableVector) {
        T::align_vector(vector, reference);
    }

    fn zero() -> Self {
        None
    }

    fn resize_vector(
        vector: &AnimatableVector,
        len: usize,
        padding: CollectionPadding,
    ) -> AnimatableVector {
        T::resize_vector(vector, len, padding)
    }
}

/// Collections concatenate the vectors of their elements, which must all
/// share the arity of `T::zero()`.
impl<T: Animatable> Animatable for Vec<T> {
    fn to_vector(&self) -> AnimatableVector {
        let mut v = AnimatableVector::new();
        for item in self {
            v.extend_from_slice(item.to_vector().as_slice());
        }
        v
    }

    fn from_vector(vector: &AnimatableVector) -> Self {
        let arity = T::zero().to_vector().len();
        if arity == 0 {
            return Vec::new();
        }
        vector
            .as_slice()
            .chunks(arity)
            .map(|chunk| T::from_vector(&AnimatableVector::from_slice(chunk)))
            .collect()
    }

    fn from_vector_like(vector: &AnimatableVector, like: &Self) -> Self {
        let arity = T::zero().to_vector().len();
        if arity == 0 {
            return Vec::new();
        }
        vector
            .as_slice()
            .chunks(arity)
            .enumerate()
            .map(|(index, chunk)| {
                let chunk = AnimatableVector::from_slice(chunk);
                match like.get(index) {
                    Some(like) => T::from_vector_like(&chunk, like),
                    None => T::from_vector(&chunk),
                }
            })
            .collect()
    }

    /// Aligns each element shared by both vectors
    fn align_vector(vector: &mut AnimatableVector, reference: &AnimatableVector) {
        let arity = T::zero().to_vector().len();
        if arity == 0 {
            return;
        }
        let shared = vector.len().min(reference.len()) / arity;
        for index in 0..shared {
            let start = index * arity;
            let end = start + arity;
            let mut element = AnimatableVector::from_slice(&vector.as_slice()[start..end]);
            let anchor = AnimatableVector::from_slice(&reference.as_slice()[start..end]);
            T::align_vector(&mut element, &anchor);
            for (offset, component) in element.iter().enumerate() {
                vector[start + offset] = *component;
            }
        }
    }

    fn zero() -> Self {
        Vec::new()
    }

    fn resize_vector(
        vector: &AnimatableVector,
        len: usize,
        padding: CollectionPadding,
    ) -> AnimatableVector {
        let neutral = T::zero().to_vector();
        let arity = neutral.len();
        if arity == 0 || len <= vector.len() {
            return vector.resized(len, 0.0);
        }

        let fill = match padding {
            CollectionPadding::RepeatLast if vector.len() >= arity => {
                AnimatableVector::from_slice(&vector.as_slice()[vector.len() - arity..])
            }
            _ => neutral,
        };

        let mut out = vector.clone();
        while out.len() < len {
            out.extend_from_slice(fill.as_slice());
        }
        out.truncate(len);
        out
    }
}
