//! Kinematic agent movement.
//!
//! This module turns a desired displacement into collision-aware motion:
//!
//! - Bounce resolution with impact-angle momentum decay
//! - Step traversal over low risers
//! - Ground classification with optional normal hysteresis
//! - Riding moving supports and inheriting their velocity
//!
//! # Design
//!
//! Every stage is an explicit call over caller-owned state. The
//! [`KinematicMover`] strings them together once per tick, but each stage is
//! usable on its own: [`BounceSolver`] only needs a [`ShapeCaster`],
//! [`GroundedState::check`] refreshes a small struct, and the
//! [`PlatformCoupler`] is driven by `follow` before moving and `update` after.
//!
//! [`ShapeCaster`]: crate::collision::ShapeCaster

mod bounce;
mod config;
mod controller;
mod ground;
mod platform;
mod step;

pub use bounce::{retained_fraction, BounceAction, BounceEvent, BounceSolver, Bounces};
pub use config::KccConfig;
pub use controller::{AgentState, KinematicMover, TickReport};
pub use ground::{snap_down, GroundedState, NormalMode};
pub use platform::{
    CouplerEvent, FollowOutcome, MovingGround, MovingPlatform, PlatformCoupler, RideDelta,
    SmoothedVector, SupportCapability, SupportLink, SupportSource,
};
