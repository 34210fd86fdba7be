//! Error types for the controller.
//!
//! Collision backend failures are surfaced as [`CasterError`] and propagated
//! unchanged; nothing in the solver tries to recover from a broken backend.
//! Degenerate geometry (zero-length vectors, coincident normals) is not an
//! error and never shows up here.

use thiserror::Error;

use crate::collision::ObjectHandle;

/// Failure reported by a [`ShapeCaster`](crate::collision::ShapeCaster) backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CasterError {
    /// The backend cannot compute a query between the agent shape and this object.
    #[error("unsupported shape pair against object {object}")]
    UnsupportedShapePair { object: ObjectHandle },

    /// The query pose contained NaN or infinite components.
    #[error("query pose is not finite: {0}")]
    NonFinitePose(glam::Vec3),
}

/// Rejected configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_bounces must be at least 1")]
    ZeroBounces,

    #[error("{field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: f32 },

    #[error("up axis {0} is not a unit vector")]
    UpAxisNotNormalized(glam::Vec3),

    #[error("skin_width must be positive, got {0}")]
    NonPositiveSkinWidth(f32),
}

/// Any error produced by the controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KccError {
    #[error("collision backend: {0}")]
    Caster(#[from] CasterError),

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}
