//! Ground classification and snapping.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::collision::{ObjectHandle, Pose, ShapeCaster};
use crate::error::CasterError;

use super::config::KccConfig;

/// Which surface normal a ground check keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalMode {
    /// Use the normal reported by this tick's probe.
    #[default]
    Probe,
    /// Keep last tick's normal when the probe lands on the same support.
    ///
    /// Right after a snap-down the probe can graze the edge it just settled
    /// on and report a shallow, different normal. Reusing the previous one
    /// keeps the slope classification from flickering.
    ReusePrevious,
}

/// Per-tick ground classification for one agent.
///
/// Refreshed once per tick by [`GroundedState::check`] and read by the bounce
/// solver (snap-up is only allowed while standing) and the platform coupler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundedState {
    /// The ground probe hit something within `ground_check_distance`.
    pub on_ground: bool,

    /// Close to walkable ground.
    pub standing_on_ground: bool,

    /// Neither standing nor sliding.
    pub falling: bool,

    /// Close to ground too steep to stand on.
    pub sliding: bool,

    /// Angle between the surface normal and up, in degrees.
    pub angle: f32,

    /// Distance the probe travelled before hitting ground.
    pub distance_to_ground: f32,

    /// Surface normal of the ground below.
    pub surface_normal: Vec3,

    /// Contact point of the probe on the ground.
    pub ground_hit_position: Vec3,

    /// Body the agent is on, if any.
    pub support: Option<ObjectHandle>,
}

impl Default for GroundedState {
    fn default() -> Self {
        Self::airborne(Vec3::Y)
    }
}

impl GroundedState {
    /// State with no ground anywhere below.
    pub fn airborne(up: Vec3) -> Self {
        Self {
            on_ground: false,
            standing_on_ground: false,
            falling: true,
            sliding: false,
            angle: 0.0,
            distance_to_ground: f32::INFINITY,
            surface_normal: up,
            ground_hit_position: Vec3::ZERO,
            support: None,
        }
    }

    /// Probe the ground below `pose` and reclassify.
    ///
    /// Classification:
    /// - no hit: falling
    /// - hit within `grounded_distance` on a walkable surface: standing
    /// - hit within `grounded_distance` on a steep surface: sliding
    /// - anything else: falling (but `on_ground` if the probe hit)
    pub fn check<C: ShapeCaster + ?Sized>(
        &mut self,
        caster: &C,
        pose: Pose,
        config: &KccConfig,
        mode: NormalMode,
    ) -> Result<(), CasterError> {
        let previous = *self;
        let hit = caster.sweep(pose, -config.up, config.ground_check_distance)?;

        let Some(hit) = hit else {
            *self = Self::airborne(config.up);
            return Ok(());
        };

        let reuse = mode == NormalMode::ReusePrevious
            && previous.on_ground
            && previous.support == Some(hit.object);
        let normal = if reuse { previous.surface_normal } else { hit.normal };

        let angle = config.surface_angle(normal);
        let close = hit.distance <= config.grounded_distance;
        let standing_on_ground = close && angle <= config.max_walk_angle;
        let sliding = close && angle > config.max_walk_angle;

        *self = Self {
            on_ground: true,
            standing_on_ground,
            falling: !(standing_on_ground || sliding),
            sliding,
            angle,
            distance_to_ground: hit.distance,
            surface_normal: normal,
            ground_hit_position: hit.point,
            support: Some(hit.object),
        };
        Ok(())
    }

    /// Support the agent is standing on (not sliding off).
    #[inline]
    pub fn standing_support(&self) -> Option<ObjectHandle> {
        if self.standing_on_ground {
            self.support
        } else {
            None
        }
    }
}

/// Displacement that settles the agent onto walkable ground just below it.
///
/// Sweeps down by `vertical_snap_down` and stops a skin width above the hit.
/// Steep hits and misses leave the agent where it is.
pub fn snap_down<C: ShapeCaster + ?Sized>(
    caster: &C,
    pose: Pose,
    config: &KccConfig,
) -> Result<Vec3, CasterError> {
    if config.vertical_snap_down <= 0.0 {
        return Ok(Vec3::ZERO);
    }

    let Some(hit) = caster.sweep(pose, -config.up, config.vertical_snap_down)? else {
        return Ok(Vec3::ZERO);
    };

    if !config.is_walkable(hit.normal) {
        return Ok(Vec3::ZERO);
    }

    let drop = (hit.distance - config.skin_width).max(0.0);
    Ok(-config.up * drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ColliderShape, CollisionWorld, ContentFlags};
    use glam::Quat;

    const AGENT: ColliderShape = ColliderShape::Capsule {
        radius: 0.5,
        height: 2.0,
    };

    fn create_test_world() -> CollisionWorld {
        let mut world = CollisionWorld::new();

        // Flat floor with its top at y=0, spanning x in [-10, 10]
        world.add_box(
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(10.0, 0.5, 10.0),
            ContentFlags::SOLID,
        );

        // 70 degree slab far away at x=50
        world.add_oriented_box(
            Pose::new(Vec3::new(50.0, 0.0, 0.0), Quat::from_rotation_z(70f32.to_radians())),
            Vec3::new(5.0, 0.5, 5.0),
            ContentFlags::SOLID,
        );

        world
    }

    #[test]
    fn test_standing_on_flat_floor() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let mut state = GroundedState::default();
        state
            .check(&caster, Pose::at(Vec3::new(0.0, 1.02, 0.0)), &config, NormalMode::Probe)
            .unwrap();

        assert!(state.on_ground);
        assert!(state.standing_on_ground);
        assert!(!state.sliding && !state.falling);
        assert!(state.angle < 1.0, "angle={}", state.angle);
        assert!((state.distance_to_ground - 0.02).abs() < 0.01);
        assert_eq!(state.support, Some(ObjectHandle(0)));
        assert_eq!(state.standing_support(), Some(ObjectHandle(0)));
    }

    #[test]
    fn test_probe_hit_but_too_far_is_falling() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let mut state = GroundedState::default();
        state
            .check(&caster, Pose::at(Vec3::new(0.0, 1.2, 0.0)), &config, NormalMode::Probe)
            .unwrap();

        assert!(state.on_ground, "probe reaches the floor");
        assert!(state.falling);
        assert!(!state.standing_on_ground && !state.sliding);
        assert_eq!(state.standing_support(), None);
    }

    #[test]
    fn test_nothing_below_is_falling() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let mut state = GroundedState::default();
        state
            .check(&caster, Pose::at(Vec3::new(0.0, 10.0, 0.0)), &config, NormalMode::Probe)
            .unwrap();

        assert!(!state.on_ground);
        assert!(state.falling);
        assert_eq!(state.support, None);
    }

    #[test]
    fn test_steep_slope_is_sliding() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        // Find the slope surface by probing from high above, then sit just over it
        let above = Pose::at(Vec3::new(50.0, 8.0, 0.0));
        let hit = caster.sweep(above, Vec3::NEG_Y, 20.0).unwrap().expect("slope below");
        let resting = above.translated(Vec3::NEG_Y * (hit.distance - 0.02));

        let mut state = GroundedState::default();
        state.check(&caster, resting, &config, NormalMode::Probe).unwrap();

        assert!(state.sliding, "angle={}", state.angle);
        assert!(!state.standing_on_ground);
        assert!((state.angle - 70.0).abs() < 1.0, "angle={}", state.angle);
    }

    #[test]
    fn test_reuse_previous_normal_on_same_support() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let tilted = Vec3::new(0.2, 1.0, 0.0).normalize();
        let mut state = GroundedState {
            on_ground: true,
            standing_on_ground: true,
            falling: false,
            surface_normal: tilted,
            support: Some(ObjectHandle(0)),
            ..GroundedState::default()
        };

        let pose = Pose::at(Vec3::new(0.0, 1.02, 0.0));
        state.check(&caster, pose, &config, NormalMode::ReusePrevious).unwrap();
        assert!((state.surface_normal - tilted).length() < 1e-6);
        assert!((state.angle - config.surface_angle(tilted)).abs() < 1e-4);

        state.check(&caster, pose, &config, NormalMode::Probe).unwrap();
        assert!((state.surface_normal - Vec3::Y).length() < 0.01);
    }

    #[test]
    fn test_reuse_ignored_for_new_support() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let tilted = Vec3::new(0.2, 1.0, 0.0).normalize();
        let mut state = GroundedState {
            on_ground: true,
            surface_normal: tilted,
            support: Some(ObjectHandle(7)),
            ..GroundedState::default()
        };

        state
            .check(&caster, Pose::at(Vec3::new(0.0, 1.02, 0.0)), &config, NormalMode::ReusePrevious)
            .unwrap();
        assert!((state.surface_normal - Vec3::Y).length() < 0.01);
    }

    #[test]
    fn test_snap_down_settles_on_floor() {
        let world = create_test_world();
        let config = KccConfig::default();
        let caster = world.caster(AGENT, config.skin_width);

        let snap = snap_down(&caster, Pose::at(Vec3::new(0.0, 1.15, 0.0)), &config).unwrap();
        // Drop 0.15 minus the skin
        assert!((snap.y + 0.14).abs() < 0.01, "snap={snap}");
        assert!(snap.x.abs() < 1e-6 && snap.z.abs() < 1e-6);

        // Out of reach: no snap
        let snap = snap_down(&caster, Pose::at(Vec3::new(0.0, 1.5, 0.0)), &config).unwrap();
        assert_eq!(snap, Vec3::ZERO);
    }
}
