//! Object transforms for the simulated scene.
//!
//! A [`Transform`] is a position, a unit-quaternion orientation and a local
//! scale.  Rotations follow the engine convention the command port was
//! designed for: Euler angles in degrees, applied Z then X then Y, and
//! [`Transform::rotate_local`] composes in the object's own frame.
//!
//! # Example
//!
//! ```rust
//! use sensorlink_scene::transform::{Quaternion, Transform};
//! use sensorlink_types::Vec3;
//!
//! let mut t = Transform::at(Vec3::zero());
//! t.rotate_local(Vec3::new(0.0, 90.0, 0.0));
//!
//! // Local forward now points along world +X.
//! let fwd = t.rotation.rotate(Vec3::FORWARD);
//! assert!((fwd.x - 1.0).abs() < 1e-5);
//! ```

use sensorlink_types::Vec3;

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_deg` degrees about `axis`.  `axis` need not be
    /// normalised; a zero axis yields the identity.
    pub fn from_axis_angle(axis: Vec3, angle_deg: f32) -> Self {
        let len = axis.length();
        if len <= f32::EPSILON {
            return Self::identity();
        }
        let half = angle_deg.to_radians() * 0.5;
        let s = half.sin() / len;
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation from Euler angles in degrees, applied Z, then X, then Y.
    pub fn from_euler_degrees(euler: Vec3) -> Self {
        let qx = Self::from_axis_angle(Vec3::RIGHT, euler.x);
        let qy = Self::from_axis_angle(Vec3::UP, euler.y);
        let qz = Self::from_axis_angle(Vec3::FORWARD, euler.z);
        qy.mul(qx).mul(qz)
    }

    /// Hamilton product: compose two rotations.
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

    /// Rescale to unit length.  Repeated composition drifts otherwise.
    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n <= f32::EPSILON {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform
// ────────────────────────────────────────────────────────────────────────────

/// World-space pose and local scale of one scene object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quaternion,
    pub scale: Vec3,
}

impl Transform {
    /// Unrotated, unit-scale transform at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quaternion::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    /// Move by `delta` in world space.
    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Rotate by Euler angles (degrees) about the object's own axes.
    pub fn rotate_local(&mut self, euler_deg: Vec3) {
        self.rotation = self
            .rotation
            .mul(Quaternion::from_euler_degrees(euler_deg))
            .normalized();
    }

    /// Place the object at `position`, keeping orientation and scale.
    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::at(Vec3::zero())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
