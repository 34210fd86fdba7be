//! Astranyx Kinematic Character Controller
//!
//! Collision-aware movement for kinematic agents (capsules, boxes, spheres)
//! driven once per fixed simulation tick. The agent is never simulated as a
//! rigid body: it asks a shape-casting backend where it can go and moves
//! there.
//!
//! # Architecture
//!
//! The crate is split into two main systems:
//!
//! - **Collision**: The [`ShapeCaster`] contract plus a bundled parry-backed
//!   [`CollisionWorld`] that implements it
//! - **Movement**: Bounce resolution, step traversal, ground classification
//!   and platform coupling built on top of any `ShapeCaster`
//!
//! # Design Principles
//!
//! 1. **Bounded**: Every resolve issues at most `max_bounces` sweeps plus a
//!    constant number for steps
//! 2. **Explicit**: Caller-owned state, no globals, no callbacks
//! 3. **Finite**: Degenerate vectors are handled, never turned into NaN

pub mod collision;
pub mod error;
pub mod math;
pub mod movement;

// Re-export commonly used types
pub use collision::{
    ColliderShape, CollisionWorld, ContentFlags, ObjectHandle, Pose, ShapeCaster, SweepHit,
};
pub use error::{CasterError, ConfigError, KccError};
pub use movement::{
    AgentState, BounceAction, BounceEvent, BounceSolver, GroundedState, KccConfig, KinematicMover,
    PlatformCoupler, TickReport,
};
