//! Primitive geometry: vectors, unit quaternions, rigid poses.
//!
//! Everything here is `f32`, matching the precision of the AR runtimes the
//! poses ultimately come from.  The types are deliberately plain (no SIMD,
//! no generic scalar) because the whole protocol moves a handful of poses
//! per tick, not point clouds.

use serde::{Deserialize, Serialize};

/// Tolerance below which a length is treated as zero.
pub const EPSILON: f32 = 1e-5;

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (position or direction) in some client-local world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }

    pub fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    /// Scalar (dot) product.
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Cross product (right-handed).
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Distance between two points.
    pub fn distance(self, rhs: Self) -> f32 {
        self.sub(rhs).length()
    }

    /// Unit vector in the same direction, or `None` when the length is
    /// below [`EPSILON`].
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len < EPSILON {
            None
        } else {
            Some(self.scale(1.0 / len))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quat
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quat {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion; use [`Quat::normalized`] when in doubt.
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` radians around a (not necessarily unit) axis.
    ///
    /// Falls back to the identity when the axis is degenerate.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        match axis.normalized() {
            Some(u) => {
                let half = angle_rad * 0.5;
                let s = half.sin();
                Self::new(half.cos(), u.x * s, u.y * s, u.z * s)
            }
            None => Self::identity(),
        }
    }

    /// Hamilton product: compose two rotations (`self` applied after `rhs`).
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }

    /// 4-D dot product.
    pub fn dot(self, rhs: Self) -> f32 {
        self.w * rhs.w + self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Renormalize to unit length.  Returns the identity for a near-zero
    /// quaternion rather than dividing by ~0.
    pub fn normalized(self) -> Self {
        let norm = self.dot(self).sqrt();
        if norm < EPSILON {
            return Self::identity();
        }
        Self::new(self.w / norm, self.x / norm, self.y / norm, self.z / norm)
    }

    /// Whether two unit quaternions represent the same rotation, allowing
    /// for the q / −q double cover.
    pub fn same_rotation(self, rhs: Self, tol: f32) -> bool {
        (self.dot(rhs).abs() - 1.0).abs() < tol
    }

    /// The world-frame images of the canonical x, y, z axes under this
    /// rotation (the columns of the equivalent rotation matrix).
    pub fn to_axes(self) -> [Vec3; 3] {
        [
            self.rotate(Vec3::new(1.0, 0.0, 0.0)),
            self.rotate(Vec3::new(0.0, 1.0, 0.0)),
            self.rotate(Vec3::new(0.0, 0.0, 1.0)),
        ]
    }

    /// Build the quaternion whose rotation matrix has the given orthonormal
    /// columns.  Shepperd's method: branch on the largest diagonal term to
    /// stay numerically stable for all rotation angles.
    ///
    /// The caller must supply a right-handed orthonormal triple; the result
    /// is renormalized but not validated.
    pub fn from_axes(x: Vec3, y: Vec3, z: Vec3) -> Self {
        // Matrix entries m[row][col]; columns are the axis images.
        let (m00, m01, m02) = (x.x, y.x, z.x);
        let (m10, m11, m12) = (x.y, y.y, z.y);
        let (m20, m21, m22) = (x.z, y.z, z.z);

        let trace = m00 + m11 + m22;
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(0.25 * s, (m21 - m12) / s, (m02 - m20) / s, (m10 - m01) / s)
        } else if m00 > m11 && m00 > m22 {
            let s = (1.0 + m00 - m11 - m22).sqrt() * 2.0;
            Self::new((m21 - m12) / s, 0.25 * s, (m01 + m10) / s, (m02 + m20) / s)
        } else if m11 > m22 {
            let s = (1.0 + m11 - m00 - m22).sqrt() * 2.0;
            Self::new((m02 - m20) / s, (m01 + m10) / s, 0.25 * s, (m12 + m21) / s)
        } else {
            let s = (1.0 + m22 - m00 - m11).sqrt() * 2.0;
            Self::new((m10 - m01) / s, (m02 + m20) / s, (m12 + m21) / s, 0.25 * s)
        };
        q.normalized()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose
// ────────────────────────────────────────────────────────────────────────────

/// A rigid pose (position + orientation) in a client-local world frame.
///
/// Two clients' `Pose` values are **not comparable**: each client's world
/// frame is established independently by its own tracking system.  Poses
/// only become comparable after encoding through a
/// [`SharedBasis`](crate::basis::SharedBasis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// The identity pose: world origin, no rotation.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quat::identity())
    }

    /// Apply this pose as a rigid transform to a point.
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position.add(self.rotation.rotate(p))
    }
}
