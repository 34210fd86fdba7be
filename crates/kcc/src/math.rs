//! Vector helpers that stay finite on degenerate input.
//!
//! The solver works with vectors that shrink towards zero by construction, so
//! none of these helpers may produce NaN for zero-length arguments.

use glam::{Quat, Vec3};

/// Length below which a movement is considered finished.
pub const EPSILON: f32 = 0.001;

/// Unsigned angle between two vectors in degrees, in `[0, 180]`.
///
/// Returns `0.0` if either vector has (near) zero length.
pub fn angle_degrees(a: Vec3, b: Vec3) -> f32 {
    let denominator = (a.length_squared() * b.length_squared()).sqrt();
    if denominator < 1e-12 {
        return 0.0;
    }
    let cos = (a.dot(b) / denominator).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

/// Remove the component of `v` along the unit `normal`.
#[inline]
pub fn project_on_plane(v: Vec3, normal: Vec3) -> Vec3 {
    v - normal * v.dot(normal)
}

/// Project `v` onto the plane of `normal`, then rescale to the original length.
///
/// Yields zero when `v` is parallel to `normal`.
#[inline]
pub fn project_on_plane_keep_length(v: Vec3, normal: Vec3) -> Vec3 {
    project_on_plane(v, normal).normalize_or_zero() * v.length()
}

/// Same direction, length reduced by `amount` (never below zero).
#[inline]
pub fn shorten(v: Vec3, amount: f32) -> Vec3 {
    v.normalize_or_zero() * (v.length() - amount).max(0.0)
}

/// Twist component of `rotation` about the unit `axis` (swing-twist split).
///
/// Used to carry an upright agent's yaw along with a tilting platform.
pub fn twist_about(rotation: Quat, axis: Vec3) -> Quat {
    let imaginary = Vec3::new(rotation.x, rotation.y, rotation.z);
    let projected = axis * imaginary.dot(axis);
    let twist = Quat::from_xyzw(projected.x, projected.y, projected.z, rotation.w);
    if twist.length_squared() < 1e-12 {
        // 180 degree swing, no defined twist
        Quat::IDENTITY
    } else {
        twist.normalize()
    }
}
