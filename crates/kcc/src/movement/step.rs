//! Step traversal: climbing short risers without counting them as walls.
//!
//! Invoked by the bounce solver after a sweep stops against a surface too
//! steep to walk on. The attempt is three sweeps:
//!
//! 1. up by at most `vertical_snap_up`,
//! 2. forward by `step_up_depth` from the raised pose,
//! 3. down by the same rise to land on the tread,
//!
//! preceded by a cheap check that the contact point is low enough to be a
//! step at all. Nothing is committed unless every sweep agrees.

use glam::Vec3;

use crate::collision::{Pose, ShapeCaster, SweepHit};
use crate::error::CasterError;
use crate::math::{project_on_plane, EPSILON};

use super::config::KccConfig;

/// Forward probes stopped closer than this many skin widths count as blocked.
const BLOCKED_SKIN_MULTIPLIER: f32 = 4.0;

/// An accepted step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct StepUp {
    /// Agent position on the tread.
    pub position: Vec3,

    /// Horizontal distance covered, consumed from the remaining movement.
    pub moved: f32,
}

/// Try to step over the obstacle that stopped a sweep.
///
/// # Arguments
///
/// * `caster` - Agent shape bound to the collision backend
/// * `contact` - Pose at which the sweep made contact
/// * `pose` - Pose after backing off the surface, where the attempt starts
/// * `remaining` - Movement left after the sweep
/// * `hit` - The hit that stopped the sweep
/// * `config` - Step limits
///
/// # Returns
///
/// `Ok(None)` when the obstacle can't be stepped over.
pub(crate) fn attempt_step_up<C: ShapeCaster + ?Sized>(
    caster: &C,
    contact: Pose,
    pose: Pose,
    remaining: Vec3,
    hit: &SweepHit,
    config: &KccConfig,
) -> Result<Option<StepUp>, CasterError> {
    let up = config.up;
    let skin = config.skin_width;

    if config.vertical_snap_up <= EPSILON || config.step_up_depth <= EPSILON {
        return Ok(None);
    }

    let horizontal = project_on_plane(remaining, up);
    let horizontal_distance = horizontal.length();
    if horizontal_distance <= EPSILON {
        log::trace!("step rejected: no horizontal movement left");
        return Ok(None);
    }
    let direction = horizontal / horizontal_distance;

    let step_height = (hit.point - caster.bottom_point(contact)).dot(up);
    if step_height > config.vertical_snap_up + skin {
        log::trace!("step rejected: contact {step_height:.3} above the feet");
        return Ok(None);
    }

    // Rise
    let rise = match caster.sweep(pose, up, config.vertical_snap_up)? {
        Some(ceiling) => (ceiling.distance - skin).max(0.0),
        None => config.vertical_snap_up,
    };
    if rise <= EPSILON {
        log::trace!("step rejected: no headroom");
        return Ok(None);
    }
    let raised = pose.translated(up * rise);

    // Advance over the tread
    let travel = config.step_up_depth.min(horizontal_distance);
    let moved = match caster.sweep(raised, direction, config.step_up_depth)? {
        Some(blocker) if blocker.distance <= skin * BLOCKED_SKIN_MULTIPLIER => {
            log::trace!(
                "step rejected: still blocked by {} after rising {rise:.3}",
                blocker.object
            );
            return Ok(None);
        }
        Some(blocker) => travel.min(blocker.distance - skin),
        None => travel,
    };
    if moved <= EPSILON {
        log::trace!("step rejected: advanced only {moved:.4}");
        return Ok(None);
    }
    let advanced = raised.translated(direction * moved);

    // Settle onto the tread
    let Some(tread) = caster.sweep(advanced, -up, rise)? else {
        log::trace!("step rejected: no tread below");
        return Ok(None);
    };
    if !config.is_walkable(tread.normal) {
        log::trace!("step rejected: tread at {:.1} degrees", config.surface_angle(tread.normal));
        return Ok(None);
    }
    let settle = (tread.distance - skin).max(0.0);
    let position = advanced.position - up * settle;

    log::trace!("step accepted onto {}: rise {:.3}, moved {moved:.3}", tread.object, rise - settle);
    Ok(Some(StepUp { position, moved }))
}
