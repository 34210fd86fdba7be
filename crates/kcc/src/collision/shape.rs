//! Agent shapes and poses.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Position and orientation of a shape in world space.
///
/// The shape is centred on `position`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Unrotated pose at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    /// Same rotation, moved by `offset`.
    #[inline]
    pub fn translated(self, offset: Vec3) -> Self {
        Self {
            position: self.position + offset,
            rotation: self.rotation,
        }
    }

    /// Map a point from this pose's local frame into world space.
    #[inline]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    /// Map a world-space point into this pose's local frame.
    #[inline]
    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

/// Convex volume swept through the world on behalf of an agent.
///
/// - **Capsule**: a pill along the local Y axis. Rides over small bumps and
///   slides around corners; the usual choice for walking characters.
/// - **Box**: an oriented box given by half-extents.
/// - **Sphere**: rolling or flying agents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColliderShape {
    Capsule {
        /// Radius of the cylinder and both caps.
        radius: f32,
        /// Total height from the bottom of the lower cap to the top of the upper cap.
        height: f32,
    },
    Box {
        half_extents: Vec3,
    },
    Sphere {
        radius: f32,
    },
}

impl ColliderShape {
    /// A 1.8m tall, 0.4m radius standing capsule.
    pub const HUMANOID: Self = Self::Capsule {
        radius: 0.4,
        height: 1.8,
    };

    /// Distance from the shape centre to its lowest extent along `up`
    /// when oriented by `rotation`.
    pub fn bottom_offset(&self, rotation: Quat, up: Vec3) -> f32 {
        let local_up = rotation.inverse() * up;
        match *self {
            Self::Capsule { radius, height } => {
                let segment_half = (height * 0.5 - radius).max(0.0);
                segment_half * local_up.y.abs() + radius
            }
            Self::Box { half_extents } => half_extents.dot(local_up.abs()),
            Self::Sphere { radius } => radius,
        }
    }

    /// Lowest point of the shape along `up` at `pose`.
    pub fn bottom_point(&self, pose: Pose, up: Vec3) -> Vec3 {
        pose.position - up * self.bottom_offset(pose.rotation, up)
    }
}

impl Default for ColliderShape {
    fn default() -> Self {
        Self::HUMANOID
    }
}
