//! Bounce solver: moving a shape through geometry in bounded iterations.
//!
//! Each iteration sweeps the shape along the movement that is left. A hit
//! moves the agent to the contact, backs it off the surface, decays the
//! remaining momentum by how head-on the impact was and redirects it along
//! the surface. The solver yields one [`BounceEvent`] per iteration, lazily,
//! so a caller can stop consuming at any point without side effects.
//!
//! # Sequence shape
//!
//! - `[Invalid]` when the start pose is already interpenetrating.
//! - `[Bounce | SnapUp]*` followed by `[Move, Stop]` when the path clears.
//! - `[Bounce | SnapUp]*` followed by `[Stop]` when momentum runs out or the
//!   bounce budget is spent.
//! - `[Bounce | SnapUp]*` followed by `[Invalid]` when a sweep starts
//!   penetrating mid-sequence.

use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::{Pose, ShapeCaster, SweepHit};
use crate::error::CasterError;
use crate::math::{angle_degrees, project_on_plane_keep_length, shorten, EPSILON};

use super::config::KccConfig;
use super::step::attempt_step_up;

/// What a single solver iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BounceAction {
    /// Unobstructed move through all remaining momentum.
    Move,
    /// Hit a surface and redirected along it.
    Bounce,
    /// Stepped over a low obstacle.
    SnapUp,
    /// Terminal: the solver is done.
    Stop,
    /// Terminal: the agent is interpenetrating and was not moved.
    Invalid,
}

impl fmt::Display for BounceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::Bounce => "bounce",
            Self::SnapUp => "snap-up",
            Self::Stop => "stop",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// One step of a resolved movement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BounceEvent {
    pub action: BounceAction,

    /// Agent position before this iteration.
    pub initial_position: Vec3,

    /// Agent position after this iteration.
    pub final_position: Vec3,

    /// Movement left before this iteration.
    pub initial_momentum: Vec3,

    /// Movement left after this iteration.
    pub remaining_momentum: Vec3,

    /// Surface that stopped the sweep, for `Bounce`, `SnapUp` and mid-sequence `Invalid`.
    pub hit: Option<SweepHit>,
}

impl BounceEvent {
    /// Displacement covered by this iteration.
    #[inline]
    pub fn displacement(&self) -> Vec3 {
        self.final_position - self.initial_position
    }

    /// Whether this event ends the sequence.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self.action, BounceAction::Stop | BounceAction::Invalid)
    }
}

/// Resolves desired movement into bounce events against a [`ShapeCaster`].
///
/// # Example
///
/// ```ignore
/// let events = BounceSolver::new(&caster, &config)
///     .snap_up(grounded.standing_on_ground)
///     .resolve(pose.position, velocity * dt, pose.rotation)
///     .collect::<Result<Vec<_>, _>>()?;
/// ```
#[derive(Debug)]
pub struct BounceSolver<'a, C: ?Sized> {
    caster: &'a C,
    config: &'a KccConfig,
    snap_up: bool,
}

impl<'a, C: ShapeCaster + ?Sized> BounceSolver<'a, C> {
    pub fn new(caster: &'a C, config: &'a KccConfig) -> Self {
        Self {
            caster,
            config,
            snap_up: false,
        }
    }

    /// Allow step traversal. Only meaningful while the agent stands on ground.
    pub fn snap_up(mut self, enabled: bool) -> Self {
        self.snap_up = enabled;
        self
    }

    /// Lazily resolve `movement` starting at `start`.
    ///
    /// No geometry is queried until the returned iterator is first polled.
    pub fn resolve(&self, start: Vec3, movement: Vec3, rotation: Quat) -> Bounces<'a, C> {
        Bounces {
            caster: self.caster,
            config: self.config,
            snap_up: self.snap_up,
            rotation,
            position: start,
            remaining: movement,
            bounces: 0,
            phase: Phase::Start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Running,
    /// A `Move` was yielded and only the `Stop` is left.
    Stopping,
    Done,
}

/// Iterator over the events of one resolve. Fused after a terminal event or an error.
#[derive(Debug)]
pub struct Bounces<'a, C: ?Sized> {
    caster: &'a C,
    config: &'a KccConfig,
    snap_up: bool,
    rotation: Quat,
    position: Vec3,
    remaining: Vec3,
    bounces: u32,
    phase: Phase,
}

impl<C: ShapeCaster + ?Sized> Bounces<'_, C> {
    /// Bounce and snap-up iterations performed so far.
    pub fn bounces(&self) -> u32 {
        self.bounces
    }

    /// Current agent position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    fn event(
        &self,
        action: BounceAction,
        initial_position: Vec3,
        initial_momentum: Vec3,
        hit: Option<SweepHit>,
    ) -> BounceEvent {
        BounceEvent {
            action,
            initial_position,
            final_position: self.position,
            initial_momentum,
            remaining_momentum: self.remaining,
            hit,
        }
    }

    fn stop(&mut self) -> BounceEvent {
        self.phase = Phase::Done;
        self.event(BounceAction::Stop, self.position, self.remaining, None)
    }

    fn start(&mut self) -> Result<BounceEvent, CasterError> {
        let overlaps = self.caster.overlapping(self.pose())?;
        if !overlaps.is_empty() {
            log::debug!("resolve started interpenetrating {overlaps:?} at {}", self.position);
            self.phase = Phase::Done;
            let initial_momentum = self.remaining;
            self.remaining = Vec3::ZERO;
            return Ok(self.event(BounceAction::Invalid, self.position, initial_momentum, None));
        }

        self.phase = Phase::Running;
        self.iterate()
    }

    fn iterate(&mut self) -> Result<BounceEvent, CasterError> {
        let config = self.config;

        let distance = self.remaining.length();
        if !distance.is_finite() {
            log::debug!("discarding non-finite movement {}", self.remaining);
            self.remaining = Vec3::ZERO;
            return Ok(self.stop());
        }
        if distance <= EPSILON {
            return Ok(self.stop());
        }
        if self.bounces >= config.max_bounces {
            log::debug!(
                "bounce budget of {} spent with {distance:.4} movement left at {}",
                config.max_bounces,
                self.position
            );
            return Ok(self.stop());
        }

        let initial_position = self.position;
        let initial_momentum = self.remaining;
        let direction = self.remaining / distance;

        let Some(hit) = self.caster.sweep(self.pose(), direction, distance)? else {
            self.position += self.remaining;
            self.remaining = Vec3::ZERO;
            self.phase = Phase::Stopping;
            return Ok(self.event(BounceAction::Move, initial_position, initial_momentum, None));
        };

        if hit.distance <= 0.0 {
            log::debug!("sweep from {} started inside {}", self.position, hit.object);
            self.phase = Phase::Done;
            self.remaining = Vec3::ZERO;
            return Ok(self.event(
                BounceAction::Invalid,
                initial_position,
                initial_momentum,
                Some(hit),
            ));
        }

        // Move to the contact, then off it
        let fraction = (hit.distance / distance).min(1.0);
        self.position += self.remaining * fraction;
        let contact = self.pose();
        self.position += hit.normal * (2.0 * config.skin_width);
        self.remaining *= 1.0 - fraction;
        self.bounces += 1;

        if self.snap_up && !config.is_walkable(hit.normal) {
            let step =
                attempt_step_up(self.caster, contact, self.pose(), self.remaining, &hit, config)?;
            if let Some(step) = step {
                self.position = step.position;
                self.remaining = shorten(self.remaining, step.moved);
                return Ok(self.event(
                    BounceAction::SnapUp,
                    initial_position,
                    initial_momentum,
                    Some(hit),
                ));
            }
        }

        self.remaining = deflect(self.remaining, hit.normal, config);
        Ok(self.event(BounceAction::Bounce, initial_position, initial_momentum, Some(hit)))
    }
}

impl<C: ShapeCaster + ?Sized> Iterator for Bounces<'_, C> {
    type Item = Result<BounceEvent, CasterError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = match self.phase {
            Phase::Start => self.start(),
            Phase::Running => self.iterate(),
            Phase::Stopping => Ok(self.stop()),
            Phase::Done => return None,
        };

        if result.is_err() {
            self.phase = Phase::Done;
        }
        Some(result)
    }
}

impl<C: ShapeCaster + ?Sized> std::iter::FusedIterator for Bounces<'_, C> {}

/// Fraction of momentum kept after hitting a surface with this normal.
///
/// Grazing impacts keep `push_decay`; head-on impacts keep a tenth of it.
pub fn retained_fraction(normal: Vec3, momentum: Vec3, config: &KccConfig) -> f32 {
    let max_shove = config.max_angle_shove.max(f32::EPSILON);
    let angle_between = (angle_degrees(normal, momentum) - 90.0).abs().clamp(0.0, max_shove);
    let normalized = (angle_between / max_shove).clamp(0.0, 1.0);
    let fraction = config.push_decay * ((1.0 - normalized).powf(config.angle_power) * 0.9 + 0.1);
    fraction.clamp(0.0, 1.0)
}

/// Decay and redirect the remaining movement along the hit surface.
fn deflect(remaining: Vec3, normal: Vec3, config: &KccConfig) -> Vec3 {
    let decayed = remaining * retained_fraction(normal, remaining, config);

    let magnitude = decayed.length();
    let along_surface = project_on_plane_keep_length(decayed, normal);
    if magnitude - along_surface.length() > EPSILON {
        // Knife edge or head-on: slide in the horizontal plane instead
        project_on_plane_keep_length(decayed, config.up)
    } else {
        along_surface
    }
}
