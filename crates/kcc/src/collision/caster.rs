//! The shape-casting contract consumed by the movement code.
//!
//! The solver never talks to a physics engine directly. It asks a
//! [`ShapeCaster`] (one agent shape bound to some collision backend) four
//! questions: where does a sweep stop, what am I overlapping, how do I get
//! out, and where are my feet.

use std::collections::BTreeSet;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::CasterError;

use super::shape::Pose;

/// Opaque identifier of a body known to the collision backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// First contact found by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepHit {
    /// Distance travelled along the sweep direction before contact.
    ///
    /// `0.0` means the shape was already penetrating along this direction.
    pub distance: f32,

    /// Contact point on the hit surface, world space.
    pub point: Vec3,

    /// Surface normal at the contact, pointing away from the hit body.
    pub normal: Vec3,

    /// Body that was hit.
    pub object: ObjectHandle,
}

/// Queries for one convex agent shape against a collision backend.
///
/// Implementations exclude the agent's own body from every query.
pub trait ShapeCaster {
    /// Sweep the shape from `pose` along `direction` for at most `max_distance`.
    ///
    /// Returns the nearest hit. A zero `max_distance` or a zero-length
    /// `direction` is a no-op that returns `Ok(None)`.
    fn sweep(
        &self,
        pose: Pose,
        direction: Vec3,
        max_distance: f32,
    ) -> Result<Option<SweepHit>, CasterError>;

    /// Bodies overlapping the shape at `pose`, ignoring contacts shallower
    /// than the caster's skin width.
    fn overlapping(&self, pose: Pose) -> Result<BTreeSet<ObjectHandle>, CasterError>;

    /// Displacement that separates the shape from everything it overlaps,
    /// clamped to `max_distance`. Zero when nothing overlaps.
    fn push_out_of_overlap(&self, pose: Pose, max_distance: f32) -> Result<Vec3, CasterError>;

    /// Lowest point of the shape along the up axis.
    fn bottom_point(&self, pose: Pose) -> Vec3;
}

impl<C: ShapeCaster + ?Sized> ShapeCaster for &C {
    fn sweep(
        &self,
        pose: Pose,
        direction: Vec3,
        max_distance: f32,
    ) -> Result<Option<SweepHit>, CasterError> {
        (**self).sweep(pose, direction, max_distance)
    }

    fn overlapping(&self, pose: Pose) -> Result<BTreeSet<ObjectHandle>, CasterError> {
        (**self).overlapping(pose)
    }

    fn push_out_of_overlap(&self, pose: Pose, max_distance: f32) -> Result<Vec3, CasterError> {
        (**self).push_out_of_overlap(pose, max_distance)
    }

    fn bottom_point(&self, pose: Pose) -> Vec3 {
        (**self).bottom_point(pose)
    }
}
