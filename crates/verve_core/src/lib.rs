//! Verve Core
//!
//! Host-side value types shared by the Verve crates:
//!
//! - **Geometry**: `Point`, `Size`, `Rect`, `Vec3` in `f64`
//! - **Color**: linear RGBA with premultiplied blending
//! - **Transforms**: `Affine2D` and `Transform3D` with component decomposition
//! - **Thread affinity**: claim and assert the UI thread

pub mod color;
pub mod geometry;
pub mod thread;
pub mod transform;

pub use color::Color;
pub use geometry::{Point, Rect, Size, Vec3};
pub use thread::{assert_ui_thread, claim_ui_thread, is_ui_thread, ui_thread};
pub use transform::{Affine2D, DecomposedAffine, DecomposedTransform, Transform3D};
