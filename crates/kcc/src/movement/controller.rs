//! Kinematic agent tick driver.
//!
//! This is the main entry point for agent movement. It strings the pieces of
//! the movement module together in a fixed order once per simulation tick:
//!
//! 1. ride the support the agent stood on last tick,
//! 2. push out of anything that moved into the agent,
//! 3. classify the ground,
//! 4. resolve the desired movement through the bounce solver,
//! 5. snap down onto ground just below,
//! 6. classify the ground again,
//! 7. update the platform link.

use glam::Vec3;

use crate::collision::{ColliderShape, CollisionWorld, Pose, ShapeCaster, WorldCaster};
use crate::error::{ConfigError, KccError};
use crate::math::EPSILON;

use super::bounce::{BounceEvent, BounceSolver};
use super::config::KccConfig;
use super::ground::{snap_down, GroundedState, NormalMode};
use super::platform::{CouplerEvent, FollowOutcome, PlatformCoupler, SupportSource};

/// Height above the requested spawn point the spawn probe starts from.
const SPAWN_PROBE_HEIGHT: f32 = 1.0;

/// Distance below the requested spawn point the spawn probe reaches.
const SPAWN_PROBE_DEPTH: f32 = 2.0;

/// Per-agent mutable state, owned by the caller.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub pose: Pose,
    pub grounded: GroundedState,
    pub coupler: PlatformCoupler,
}

impl AgentState {
    pub fn new(pose: Pose, config: &KccConfig) -> Self {
        Self {
            pose,
            grounded: GroundedState::airborne(config.up),
            coupler: PlatformCoupler::new(config),
        }
    }
}

/// What happened during one [`KinematicMover::tick`].
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Events of this tick's resolve, terminal event included.
    pub events: Vec<BounceEvent>,

    /// Total displacement this tick: ride, depenetration, movement and snap.
    pub displacement: Vec3,

    /// Velocity handed over when the agent left its support this tick.
    pub launch_velocity: Option<Vec3>,

    /// Velocity of the ground under the agent after the tick.
    pub ground_velocity: Vec3,

    /// Displacement applied by the snap-down, zero when it didn't engage.
    pub snapped_down: Vec3,

    /// What the platform coupler did at the end of the tick.
    pub coupling: CouplerEvent,
}

/// Kinematic movement for agents of one shape.
///
/// # Example
///
/// ```ignore
/// let mover = KinematicMover::new(KccConfig::default(), ColliderShape::HUMANOID)?;
/// let mut state = mover.spawn_at(&mover.bind(&world), spawn_point)?;
///
/// // Each tick:
/// world.step(dt);
/// let report = mover.tick(&mover.bind(&world), &world, &mut state, velocity * dt, dt)?;
/// velocity += report.launch_velocity.unwrap_or_default();
/// ```
#[derive(Debug, Clone)]
pub struct KinematicMover {
    pub config: KccConfig,
    pub shape: ColliderShape,
}

impl KinematicMover {
    /// Create a mover, rejecting out-of-range tuning.
    pub fn new(config: KccConfig, shape: ColliderShape) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, shape })
    }

    /// Bind this mover's shape to a collision world.
    pub fn bind<'w>(&self, world: &'w CollisionWorld) -> WorldCaster<'w> {
        world
            .caster(self.shape, self.config.skin_width)
            .with_up(self.config.up)
    }

    /// Place a new agent on the ground below `spawn_point`.
    ///
    /// Probes down from slightly above the spawn point and rests the agent a
    /// skin width above whatever it finds. Without ground the agent spawns
    /// where requested.
    pub fn spawn_at<C: ShapeCaster + ?Sized>(
        &self,
        caster: &C,
        spawn_point: Vec3,
    ) -> Result<AgentState, KccError> {
        let up = self.config.up;
        let probe_start = Pose::at(spawn_point + up * SPAWN_PROBE_HEIGHT);
        let probe_distance = SPAWN_PROBE_HEIGHT + SPAWN_PROBE_DEPTH;

        let pose = match caster.sweep(probe_start, -up, probe_distance)? {
            Some(hit) => {
                let drop = (hit.distance - self.config.skin_width).max(0.0);
                probe_start.translated(-up * drop)
            }
            None => Pose::at(spawn_point),
        };

        let mut state = AgentState::new(pose, &self.config);
        state.grounded.check(caster, pose, &self.config, NormalMode::Probe)?;
        Ok(state)
    }

    /// Advance one agent by one tick.
    ///
    /// # Arguments
    ///
    /// * `caster` - The agent's shape bound to the collision backend
    /// * `supports` - Lookup of support poses and velocities
    /// * `state` - The agent's state (will be modified)
    /// * `desired` - Displacement the agent wants this tick
    /// * `delta_time` - Time step in seconds
    pub fn tick<C, S>(
        &self,
        caster: &C,
        supports: &S,
        state: &mut AgentState,
        desired: Vec3,
        delta_time: f32,
    ) -> Result<TickReport, KccError>
    where
        C: ShapeCaster + ?Sized,
        S: SupportSource + ?Sized,
    {
        let config = &self.config;
        let tick_start = state.pose.position;
        let mut launch_velocity = None;

        // Ride
        match state.coupler.follow(supports, state.pose, config) {
            FollowOutcome::Ride(delta) => state.pose = delta.apply(state.pose),
            FollowOutcome::Lost { launch_velocity: velocity } => launch_velocity = Some(velocity),
            FollowOutcome::Free => {}
        }

        // Depenetrate
        let max_push = config.max_push_speed * delta_time.max(0.0);
        let push = caster.push_out_of_overlap(state.pose, max_push)?;
        if push.length_squared() > 0.0 {
            log::debug!("pushed agent out of overlap by {push}");
            state.pose = state.pose.translated(push);
        }

        // Classify
        state.grounded.check(caster, state.pose, config, NormalMode::Probe)?;
        let standing = state.grounded.standing_on_ground;

        // Move
        let before_move = state.pose.position;
        let events = BounceSolver::new(caster, config)
            .snap_up(standing)
            .resolve(before_move, desired, state.pose.rotation)
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(last) = events.last() {
            state.pose.position = last.final_position;
        }

        // Snap down
        let moved_up = (state.pose.position - before_move).dot(config.up) > EPSILON;
        let snapped_down = if standing && !moved_up {
            snap_down(caster, state.pose, config)?
        } else {
            Vec3::ZERO
        };
        state.pose = state.pose.translated(snapped_down);

        // Reclassify
        let mode = if snapped_down.length() > EPSILON {
            NormalMode::ReusePrevious
        } else {
            NormalMode::Probe
        };
        state.grounded.check(caster, state.pose, config, mode)?;

        // Couple
        let displacement = state.pose.position - tick_start;
        let coupling = state
            .coupler
            .update(supports, &state.grounded, state.pose, displacement, delta_time, config);
        if let CouplerEvent::Detached { launch_velocity: velocity } = coupling {
            launch_velocity = Some(velocity);
        }

        Ok(TickReport {
            events,
            displacement,
            launch_velocity,
            ground_velocity: state.coupler.ground_velocity(),
            snapped_down,
            coupling,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{BodyMotion, ContentFlags, ObjectHandle};
    use crate::movement::{BounceAction, MovingPlatform};

    const DT: f32 = 0.02;

    const AGENT: ColliderShape = ColliderShape::Capsule {
        radius: 0.5,
        height: 2.0,
    };

    fn create_mover() -> KinematicMover {
        KinematicMover::new(KccConfig::default(), AGENT).expect("default config is valid")
    }

    fn create_test_world() -> CollisionWorld {
        let mut world = CollisionWorld::new();

        // Upper floor with its top at y=0 for x < 0
        world.add_box(
            Vec3::new(-10.0, -0.5, 0.0),
            Vec3::new(10.0, 0.5, 10.0),
            ContentFlags::SOLID,
        );

        // Lower floor with its top at y=-0.15 for x > 0
        world.add_box(
            Vec3::new(10.0, -0.65, 0.0),
            Vec3::new(10.0, 0.5, 10.0),
            ContentFlags::SOLID,
        );

        world
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = KccConfig {
            max_bounces: 0,
            ..Default::default()
        };
        assert_eq!(KinematicMover::new(config, AGENT).err(), Some(ConfigError::ZeroBounces));
    }

    #[test]
    fn test_spawn_rests_on_ground() {
        crate::test_support::init_logging();
        let world = create_test_world();
        let mover = create_mover();

        let state = mover.spawn_at(&mover.bind(&world), Vec3::new(-5.0, 0.3, 0.0)).unwrap();
        let feet = AGENT.bottom_point(state.pose, Vec3::Y);
        assert!((feet.y - mover.config.skin_width).abs() < 0.005, "feet={feet}");
        assert!(state.grounded.standing_on_ground);
        assert_eq!(state.grounded.support, Some(ObjectHandle(0)));

        let empty = CollisionWorld::new();
        let state = mover.spawn_at(&mover.bind(&empty), Vec3::new(0.0, 5.0, 0.0)).unwrap();
        assert_eq!(state.pose.position, Vec3::new(0.0, 5.0, 0.0));
        assert!(state.grounded.falling);
    }

    #[test]
    fn test_walk_on_flat_ground() {
        crate::test_support::init_logging();
        let world = create_test_world();
        let mover = create_mover();
        let caster = mover.bind(&world);
        let mut state = mover.spawn_at(&caster, Vec3::new(-8.0, 1.0, 0.0)).unwrap();
        let start = state.pose.position;

        for _ in 0..10 {
            let report = mover
                .tick(&caster, &world, &mut state, Vec3::new(0.0, 0.0, 0.05), DT)
                .unwrap();
            assert_eq!(
                report.events.iter().map(|e| e.action).collect::<Vec<_>>(),
                vec![BounceAction::Move, BounceAction::Stop]
            );
            assert!(state.grounded.standing_on_ground);
        }

        let moved = state.pose.position - start;
        assert!((moved.z - 0.5).abs() < 1e-3, "moved={moved}");
        assert!(moved.y.abs() < 1e-3, "moved={moved}");
    }

    #[test]
    fn test_walk_off_ledge_snaps_down() {
        crate::test_support::init_logging();
        let world = create_test_world();
        let mover = create_mover();
        let caster = mover.bind(&world);
        let mut state = mover.spawn_at(&caster, Vec3::new(-1.0, 1.0, 0.0)).unwrap();
        assert!(state.grounded.standing_on_ground);

        let report = mover.tick(&caster, &world, &mut state, Vec3::new(2.0, 0.0, 0.0), DT).unwrap();

        assert!((report.snapped_down.y + 0.15).abs() < 0.01, "snapped={}", report.snapped_down);
        assert!(state.grounded.standing_on_ground);
        assert_eq!(state.grounded.support, Some(ObjectHandle(1)));
    }

    #[test]
    fn test_snap_down_keeps_previous_normal_on_same_support() {
        crate::test_support::init_logging();

        // One hull: flat top for x < 0, then a 10 degree downhill for x > 0
        let drop = 5.0 * 10f32.to_radians().tan();
        let mut points = Vec::new();
        for z in [-5.0, 5.0] {
            points.extend([
                Vec3::new(-5.0, 0.0, z),
                Vec3::new(0.0, 0.0, z),
                Vec3::new(5.0, -drop, z),
                Vec3::new(5.0, -2.0, z),
                Vec3::new(-5.0, -2.0, z),
            ]);
        }
        let mut world = CollisionWorld::new();
        let hill = world
            .add_convex_hull(&points, ContentFlags::SOLID)
            .expect("valid hull");

        let mover = create_mover();
        let caster = mover.bind(&world);
        let mut state = mover.spawn_at(&caster, Vec3::new(-0.3, 1.0, 0.0)).unwrap();
        assert!(state.grounded.angle < 1.0, "angle={}", state.grounded.angle);
        let flat_normal = state.grounded.surface_normal;

        // Walk over the crest; the snap lands on the downhill face of the same hull
        let report = mover.tick(&caster, &world, &mut state, Vec3::new(0.8, 0.0, 0.0), DT).unwrap();
        assert!(report.snapped_down.y < -0.05, "snapped={}", report.snapped_down);
        assert_eq!(state.grounded.support, Some(hill));
        assert!(state.grounded.standing_on_ground);
        assert_eq!(state.grounded.surface_normal, flat_normal);
        assert!(state.grounded.angle < 1.0, "angle={}", state.grounded.angle);

        // A tick without a snap probes the slope itself
        let report = mover.tick(&caster, &world, &mut state, Vec3::ZERO, DT).unwrap();
        assert!(report.snapped_down.length() <= EPSILON, "snapped={}", report.snapped_down);
        assert!((state.grounded.angle - 10.0).abs() < 1.0, "angle={}", state.grounded.angle);
    }

    #[test]
    fn test_jump_does_not_snap_down() {
        let world = create_test_world();
        let mover = create_mover();
        let caster = mover.bind(&world);
        let mut state = mover.spawn_at(&caster, Vec3::new(-5.0, 1.0, 0.0)).unwrap();

        let report = mover.tick(&caster, &world, &mut state, Vec3::new(0.0, 0.1, 0.0), DT).unwrap();
        assert_eq!(report.snapped_down, Vec3::ZERO);
        assert!(!state.grounded.standing_on_ground);
        assert!((report.displacement.y - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_depenetrates_before_moving() {
        crate::test_support::init_logging();
        let world = create_test_world();
        let mover = create_mover();
        let caster = mover.bind(&world);

        // Sunk 0.1 into the upper floor
        let mut state = AgentState::new(Pose::at(Vec3::new(-5.0, 0.9, 0.0)), &mover.config);
        let report = mover.tick(&caster, &world, &mut state, Vec3::new(0.0, 0.0, 0.1), DT).unwrap();

        assert_eq!(report.events.first().map(|e| e.action), Some(BounceAction::Move));
        let feet = AGENT.bottom_point(state.pose, Vec3::Y);
        assert!(feet.y >= -1e-3, "should be out of the floor: {feet}");
        assert!((state.pose.position.z - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_rides_moving_platform() {
        crate::test_support::init_logging();
        let velocity = Vec3::new(1.0, 0.0, 0.0);
        let mut world = CollisionWorld::new();
        let platform = world.add_box(
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(20.0, 0.5, 20.0),
            ContentFlags::SOLID,
        );
        world.set_motion(
            platform,
            BodyMotion::Kinematic {
                linear_velocity: velocity,
                angular_velocity: Vec3::ZERO,
            },
        );

        let mover = create_mover();
        let mut state = mover.spawn_at(&mover.bind(&world), Vec3::Y).unwrap();

        // First tick links the agent to the platform
        let own = Vec3::new(0.0, 0.0, 0.01);
        let report = mover.tick(&mover.bind(&world), &world, &mut state, own, DT).unwrap();
        assert_eq!(report.coupling, CouplerEvent::Attached(platform));
        let start = state.pose.position;

        let ticks = 25;
        for _ in 0..ticks {
            world.step(DT);
            let report = mover.tick(&mover.bind(&world), &world, &mut state, own, DT).unwrap();
            assert_eq!(report.coupling, CouplerEvent::Stayed(platform));
            assert_eq!(report.ground_velocity, velocity);
        }

        let expected = (own + velocity * DT) * ticks as f32;
        let moved = state.pose.position - start;
        assert!((moved - expected).length() < 1e-3, "moved={moved} expected={expected}");

        // Jumping off hands over the platform velocity
        world.step(DT);
        let report = mover
            .tick(&mover.bind(&world), &world, &mut state, Vec3::new(0.0, 0.5, 0.0), DT)
            .unwrap();
        assert_eq!(report.launch_velocity, Some(velocity));
        assert!(state.coupler.link().is_none());
    }

    #[test]
    fn test_rides_moving_ground_with_weights() {
        let mut world = CollisionWorld::new();
        let platform = world.add_box(
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(20.0, 0.5, 20.0),
            ContentFlags::SOLID,
        );
        let ground = MovingPlatform::new(Vec3::new(2.0, 0.0, 0.0)).with_weights(1.0, 0.5);
        world.set_motion(platform, BodyMotion::Platform(Box::new(ground)));

        let mover = create_mover();
        let mut state = mover.spawn_at(&mover.bind(&world), Vec3::Y).unwrap();
        mover.tick(&mover.bind(&world), &world, &mut state, Vec3::ZERO, DT).unwrap();
        let start = state.pose.position;

        world.step(DT);
        let report = mover.tick(&mover.bind(&world), &world, &mut state, Vec3::ZERO, DT).unwrap();

        // Position coupling is unweighted, velocity transfer is halved
        assert!(((state.pose.position - start).x - 2.0 * DT).abs() < 1e-4);
        assert!((report.ground_velocity - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_support_removed_while_riding() {
        let velocity = Vec3::new(0.0, 0.0, 3.0);
        let mut world = CollisionWorld::new();
        world.add_box(
            Vec3::new(0.0, -1.5, 0.0),
            Vec3::new(50.0, 0.5, 50.0),
            ContentFlags::SOLID,
        );
        let platform = world.add_box(
            Vec3::new(0.0, -0.5, 0.0),
            Vec3::new(2.0, 0.5, 2.0),
            ContentFlags::SOLID,
        );
        world.set_motion(
            platform,
            BodyMotion::Kinematic {
                linear_velocity: velocity,
                angular_velocity: Vec3::ZERO,
            },
        );

        let mover = create_mover();
        let mut state = mover.spawn_at(&mover.bind(&world), Vec3::Y).unwrap();
        mover.tick(&mover.bind(&world), &world, &mut state, Vec3::ZERO, DT).unwrap();
        assert_eq!(state.coupler.link().map(|l| l.support), Some(platform));

        world.remove(platform);
        let report = mover.tick(&mover.bind(&world), &world, &mut state, Vec3::ZERO, DT).unwrap();
        assert_eq!(report.launch_velocity, Some(velocity));
        assert!(state.coupler.link().is_none());
        assert!(state.grounded.falling);
    }
}
