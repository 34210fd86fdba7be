//! Collision queries for kinematic agents.
//!
//! This module provides the [`ShapeCaster`] contract the movement code is
//! written against, and a parry-backed implementation over a
//! [`CollisionWorld`].
//!
//! # Key Types
//!
//! - [`ShapeCaster`]: sweep, overlap, push-out and bottom-point queries for one agent shape
//! - [`SweepHit`]: first contact reported by a sweep
//! - [`CollisionWorld`]: static and moving bodies
//! - [`WorldCaster`]: an agent shape bound to a world
//!
//! # Query Semantics
//!
//! Sweeps report the nearest hit and exclude the agent's own body. A hit at
//! distance `0.0` means the shape was already penetrating along the sweep
//! direction. Overlap queries ignore contacts shallower than the skin width
//! so resting on a floor is not reported as interpenetration.

mod caster;
mod flags;
mod shape;
mod world;

pub use caster::{ObjectHandle, ShapeCaster, SweepHit};
pub use flags::ContentFlags;
pub use shape::{ColliderShape, Pose};
pub use world::{BodyMotion, CollisionBody, CollisionWorld, WorldCaster};
