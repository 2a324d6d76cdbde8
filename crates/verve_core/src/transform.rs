//! 2D and 3D transforms
//!
//! Besides the usual constructors, both transform types can be decomposed into
//! independent components (translation, scale, rotation, shear, perspective)
//! and rebuilt from them. Interpolating the components instead of raw matrix
//! entries keeps intermediate frames free of the shearing and collapsing that
//! element-wise matrix blending produces.

use crate::geometry::{Point, Vec3};

const EPSILON: f64 = 1e-12;

// ─────────────────────────────────────────────────────────────────────────────
// 2D Affine Transform
// ─────────────────────────────────────────────────────────────────────────────

/// 2D affine transformation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2D {
    /// Matrix elements [a, b, c, d, tx, ty]
    /// | a  c  tx |
    /// | b  d  ty |
    /// | 0  0   1 |
    pub elements: [f64; 6],
}

impl Default for Affine2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Components of an [`Affine2D`], applied as translate · rotate · shear · scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecomposedAffine {
    pub translation: [f64; 2],
    pub scale: [f64; 2],
    /// Radians
    pub rotation: f64,
    /// Horizontal shear factor applied before rotation
    pub shear: f64,
}

impl Affine2D {
    pub const IDENTITY: Affine2D = Affine2D {
        elements: [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
    };

    pub fn translation(x: f64, y: f64) -> Self {
        Self {
            elements: [1.0, 0.0, 0.0, 1.0, x, y],
        }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self {
            elements: [sx, 0.0, 0.0, sy, 0.0, 0.0],
        }
    }

    pub fn rotation(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            elements: [c, s, -s, c, 0.0, 0.0],
        }
    }

    pub fn transform_point(&self, point: Point) -> Point {
        let [a, b, c, d, tx, ty] = self.elements;
        Point::new(a * point.x + c * point.y + tx, b * point.x + d * point.y + ty)
    }

    /// Concatenate: the result applies `other` first, then `self`
    pub fn then(&self, other: &Affine2D) -> Affine2D {
        let [a1, b1, c1, d1, tx1, ty1] = self.elements;
        let [a2, b2, c2, d2, tx2, ty2] = other.elements;
        Affine2D {
            elements: [
                a1 * a2 + c1 * b2,
                b1 * a2 + d1 * b2,
                a1 * c2 + c1 * d2,
                b1 * c2 + d1 * d2,
                a1 * tx2 + c1 * ty2 + tx1,
                b1 * tx2 + d1 * ty2 + ty1,
            ],
        }
    }

    pub fn determinant(&self) -> f64 {
        let [a, b, c, d, _, _] = self.elements;
        a * d - b * c
    }

    /// Split into translation, rotation, shear and scale
    ///
    /// Singular transforms decompose lossily: a zero first column keeps only
    /// the second column's direction and length.
    pub fn decompose(&self) -> DecomposedAffine {
        let [a, b, c, d, tx, ty] = self.elements;
        let sx = a.hypot(b);

        let (rotation, sy, shear) = if sx > EPSILON {
            let rotation = b.atan2(a);
            let (sin, cos) = rotation.sin_cos();
            let sy = (a * d - b * c) / sx;
            let shear = if sy.abs() > EPSILON {
                (c * cos + d * sin) / sy
            } else {
                0.0
            };
            (rotation, sy, shear)
        } else {
            let sy = c.hypot(d);
            let rotation = if sy > EPSILON {
                d.atan2(c) - std::f64::consts::FRAC_PI_2
            } else {
                0.0
            };
            (rotation, sy, 0.0)
        };

        DecomposedAffine {
            translation: [tx, ty],
            scale: [sx, sy],
            rotation,
            shear,
        }
    }

    /// Inverse of [`Affine2D::decompose`]
    pub fn recompose(parts: &DecomposedAffine) -> Self {
        let (sin, cos) = parts.rotation.sin_cos();
        let [sx, sy] = parts.scale;
        let k = parts.shear;
        Self {
            elements: [
                sx * cos,
                sx * sin,
                sy * (k * cos - sin),
                sy * (k * sin + cos),
                parts.translation[0],
                parts.translation[1],
            ],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// 3D Transform
// ─────────────────────────────────────────────────────────────────────────────

/// 4x4 transformation matrix (column-major, column vectors)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    pub cols: [[f64; 4]; 4],
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Components of a [`Transform3D`]
///
/// The matrix is rebuilt as perspective · translate · rotate · skew · scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecomposedTransform {
    pub translation: [f64; 3],
    pub scale: [f64; 3],
    /// Shear factors `[xy, xz, yz]`
    pub skew: [f64; 3],
    /// Rotation quaternion `[x, y, z, w]`
    pub quaternion: [f64; 4],
    /// Bottom matrix row `[x, y, z, w]`, `[0, 0, 0, 1]` for affine transforms
    pub perspective: [f64; 4],
}

impl Transform3D {
    pub const IDENTITY: Transform3D = Transform3D {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[3] = [x, y, z, 1.0];
        m
    }

    pub fn scale(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::IDENTITY;
        m.cols[0][0] = x;
        m.cols[1][1] = y;
        m.cols[2][2] = z;
        m
    }

    pub fn rotation_x(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.cols[1] = [0.0, c, s, 0.0];
        m.cols[2] = [0.0, -s, c, 0.0];
        m
    }

    pub fn rotation_y(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.cols[0] = [c, 0.0, -s, 0.0];
        m.cols[2] = [s, 0.0, c, 0.0];
        m
    }

    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        let mut m = Self::IDENTITY;
        m.cols[0] = [c, s, 0.0, 0.0];
        m.cols[1] = [-s, c, 0.0, 0.0];
        m
    }

    /// Perspective projection with the viewer at distance `d` on the z axis
    pub fn perspective(d: f64) -> Self {
        let mut m = Self::IDENTITY;
        if d.abs() > EPSILON {
            m.cols[2][3] = -1.0 / d;
        }
        m
    }

    /// Multiply two matrices (`self * other`)
    pub fn mul(&self, other: &Transform3D) -> Transform3D {
        let mut result = [[0.0f64; 4]; 4];
        for (i, col) in result.iter_mut().enumerate() {
            for (j, cell) in col.iter_mut().enumerate() {
                for k in 0..4 {
                    *cell += self.cols[k][j] * other.cols[i][k];
                }
            }
        }
        Transform3D { cols: result }
    }

    /// Transform a point, dividing by the homogeneous coordinate
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let mut out = [0.0; 4];
        let input = [p.x, p.y, p.z, 1.0];
        for (row, value) in out.iter_mut().enumerate() {
            *value = (0..4).map(|col| self.cols[col][row] * input[col]).sum();
        }
        let w = if out[3].abs() > EPSILON { out[3] } else { 1.0 };
        Vec3::new(out[0] / w, out[1] / w, out[2] / w)
    }

    fn column(&self, index: usize) -> Vec3 {
        let c = self.cols[index];
        Vec3::new(c[0], c[1], c[2])
    }

    /// Split the matrix into interpolable components
    ///
    /// A singular upper 3x3 block decomposes lossily; everything else
    /// round-trips through [`Transform3D::recompose`].
    pub fn decompose(&self) -> DecomposedTransform {
        let m = self;
        let c0 = m.column(0);
        let c1 = m.column(1);
        let c2 = m.column(2);
        let t = m.column(3);
        let bottom = [m.cols[0][3], m.cols[1][3], m.cols[2][3]];

        // Perspective: solve qᵀA = bottom for q using the reciprocal basis
        let mut q = Vec3::ZERO;
        if bottom.iter().any(|v| v.abs() > EPSILON) {
            let det = c0.dot(c1.cross(c2));
            if det.abs() > EPSILON {
                q = c1
                    .cross(c2)
                    .scale(bottom[0])
                    .add(c2.cross(c0).scale(bottom[1]))
                    .add(c0.cross(c1).scale(bottom[2]))
                    .scale(1.0 / det);
            }
        }
        let q4 = m.cols[3][3] - q.dot(t);

        // Gram-Schmidt on the linear block
        let q0 = orthonormal(c0, &[]);
        let s0 = q0.dot(c0);
        let k01 = q0.dot(c1);
        let q1 = orthonormal(c1.sub(q0.scale(k01)), &[q0]);
        let s1 = q1.dot(c1);
        let k02 = q0.dot(c2);
        let k12 = q1.dot(c2);
        let mut q2 = orthonormal(c2.sub(q0.scale(k02)).sub(q1.scale(k12)), &[q0, q1]);
        if q0.dot(q1.cross(q2)) < 0.0 {
            q2 = q2.scale(-1.0);
        }
        let s2 = q2.dot(c2);

        let ratio = |num: f64, den: f64| if den.abs() > EPSILON { num / den } else { 0.0 };

        DecomposedTransform {
            translation: [t.x, t.y, t.z],
            scale: [s0, s1, s2],
            skew: [ratio(k01, s1), ratio(k02, s2), ratio(k12, s2)],
            quaternion: quaternion_from_basis(q0, q1, q2),
            perspective: [q.x, q.y, q.z, q4],
        }
    }

    /// Inverse of [`Transform3D::decompose`]
    pub fn recompose(parts: &DecomposedTransform) -> Self {
        let [q0, q1, q2] = basis_from_quaternion(parts.quaternion);
        let [s0, s1, s2] = parts.scale;
        let [xy, xz, yz] = parts.skew;

        let l0 = q0.scale(s0);
        let l1 = q0.scale(xy * s1).add(q1.scale(s1));
        let l2 = q0.scale(xz * s2).add(q1.scale(yz * s2)).add(q2.scale(s2));
        let [tx, ty, tz] = parts.translation;
        let t = Vec3::new(tx, ty, tz);
        let [px, py, pz, pw] = parts.perspective;
        let q = Vec3::new(px, py, pz);

        Transform3D {
            cols: [
                [l0.x, l0.y, l0.z, q.dot(l0)],
                [l1.x, l1.y, l1.z, q.dot(l1)],
                [l2.x, l2.y, l2.z, q.dot(l2)],
                [t.x, t.y, t.z, q.dot(t) + pw],
            ],
        }
    }
}

/// Normalize `v`, falling back to the first axis orthogonal to `basis`
fn orthonormal(v: Vec3, basis: &[Vec3]) -> Vec3 {
    if v.length() > EPSILON {
        return v.normalize();
    }
    if let [a, b] = basis {
        return a.cross(*b).normalize();
    }
    for axis in [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)] {
        let candidate = basis
            .iter()
            .fold(axis, |acc, b| acc.sub(b.scale(b.dot(axis))));
        if candidate.length() > EPSILON {
            return candidate.normalize();
        }
    }
    Vec3::new(1.0, 0.0, 0.0)
}

/// Quaternion `[x, y, z, w]` of the rotation whose columns are `c0, c1, c2`
fn quaternion_from_basis(c0: Vec3, c1: Vec3, c2: Vec3) -> [f64; 4] {
    let (r00, r10, r20) = (c0.x, c0.y, c0.z);
    let (r01, r11, r21) = (c1.x, c1.y, c1.z);
    let (r02, r12, r22) = (c2.x, c2.y, c2.z);
    let trace = r00 + r11 + r22;

    if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        [(r21 - r12) / s, (r02 - r20) / s, (r10 - r01) / s, s / 4.0]
    } else if r00 > r11 && r00 > r22 {
        let s = (1.0 + r00 - r11 - r22).sqrt() * 2.0;
        [s / 4.0, (r01 + r10) / s, (r02 + r20) / s, (r21 - r12) / s]
    } else if r11 > r22 {
        let s = (1.0 + r11 - r00 - r22).sqrt() * 2.0;
        [(r01 + r10) / s, s / 4.0, (r12 + r21) / s, (r02 - r20) / s]
    } else {
        let s = (1.0 + r22 - r00 - r11).sqrt() * 2.0;
        [(r02 + r20) / s, (r12 + r21) / s, s / 4.0, (r10 - r01) / s]
    }
}

/// Rotation basis columns for a (not necessarily normalized) quaternion
fn basis_from_quaternion(q: [f64; 4]) -> [Vec3; 3] {
    let len = q.iter().map(|v| v * v).sum::<f64>().sqrt();
    let [x, y, z, w] = if len > EPSILON {
        q.map(|v| v / len)
    } else {
        [0.0, 0.0, 0.0, 1.0]
    };

    [
        Vec3::new(
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y + z * w),
            2.0 * (x * z - y * w),
        ),
        Vec3::new(
            2.0 * (x * y - z * w),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z + x * w),
        ),
        Vec3::new(
            2.0 * (x * z + y * w),
            2.0 * (y * z - x * w),
            1.0 - 2.0 * (x * x + y * y),
        ),
    ]
}
