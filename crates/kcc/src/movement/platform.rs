//! Riding moving supports and inheriting their velocity.
//!
//! The [`PlatformCoupler`] owns the agent's link to whatever it stands on.
//! Each tick it does two independent things:
//!
//! - **Position coupling**: before the agent moves, [`PlatformCoupler::follow`]
//!   reports how far the support carried the agent since the last tick. The
//!   caller adds that displacement directly; it never goes through the bounce
//!   solver, so a platform is never an obstacle to itself.
//! - **Velocity coupling**: after the agent moves, [`PlatformCoupler::update`]
//!   recomputes the ground velocity and, when the agent leaves the ground,
//!   hands it back as the launch velocity.
//!
//! What kind of support the agent is on is decided once at attach time and
//! stored in the [`SupportLink`].

use std::collections::VecDeque;
use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::collision::{ObjectHandle, Pose};
use crate::math::twist_about;

use super::config::KccConfig;
use super::ground::GroundedState;

/// Capability contract for ground that moves agents standing on it.
pub trait MovingGround: fmt::Debug + Send + Sync {
    /// Linear velocity of the support.
    fn linear_velocity(&self) -> Vec3;

    /// Angular velocity of the support about its pose origin (axis * rad/s).
    fn angular_velocity(&self) -> Vec3 {
        Vec3::ZERO
    }

    /// Velocity of the support surface at a world-space point.
    fn velocity_at_point(&self, pose: &Pose, point: Vec3) -> Vec3 {
        self.linear_velocity() + self.angular_velocity().cross(point - pose.position)
    }

    /// How strongly the agent moves with the support, in `[0, 1]`.
    fn movement_weight(&self, _point: Vec3, _agent_velocity: Vec3) -> f32 {
        1.0
    }

    /// How much of the support velocity is handed over on launch, in `[0, 1]`.
    fn transfer_weight(&self, _point: Vec3, _agent_velocity: Vec3) -> f32 {
        1.0
    }

    /// Carry the agent but never transfer momentum (e.g. fast conveyor belts).
    fn avoid_transfer(&self) -> bool {
        false
    }

    /// Whether the agent rides along (position coupling) at all.
    fn should_attach(&self) -> bool {
        true
    }
}

/// How a support reports its motion, resolved once when an agent attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportCapability {
    /// Implements [`MovingGround`].
    MovingGround,
    /// Exposes a plain velocity, no transfer rules.
    Velocity,
    /// No velocity concept; launch velocity comes from the agent's own history.
    Static,
}

/// Lookup of supports by handle, implemented by the collision backend.
pub trait SupportSource {
    /// Current pose, or `None` if the support no longer exists.
    fn support_pose(&self, handle: ObjectHandle) -> Option<Pose>;

    fn support_capability(&self, handle: ObjectHandle) -> SupportCapability;

    fn moving_ground(&self, handle: ObjectHandle) -> Option<&dyn MovingGround>;

    /// Generic velocity at a world-space point, for supports that have one.
    fn support_velocity_at(&self, handle: ObjectHandle, point: Vec3) -> Option<Vec3>;
}

/// Stock [`MovingGround`]: constant linear and angular velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingPlatform {
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub movement_weight: f32,
    pub transfer_weight: f32,
    pub avoid_transfer: bool,
    pub attach: bool,
}

impl MovingPlatform {
    /// Translating platform with full weights.
    pub fn new(linear_velocity: Vec3) -> Self {
        Self {
            linear_velocity,
            angular_velocity: Vec3::ZERO,
            movement_weight: 1.0,
            transfer_weight: 1.0,
            avoid_transfer: false,
            attach: true,
        }
    }

    /// Platform spinning in place.
    pub fn rotating(angular_velocity: Vec3) -> Self {
        Self {
            angular_velocity,
            ..Self::new(Vec3::ZERO)
        }
    }

    pub fn with_weights(mut self, movement_weight: f32, transfer_weight: f32) -> Self {
        self.movement_weight = movement_weight;
        self.transfer_weight = transfer_weight;
        self
    }

    pub fn without_transfer(mut self) -> Self {
        self.avoid_transfer = true;
        self
    }
}

impl MovingGround for MovingPlatform {
    fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn movement_weight(&self, _point: Vec3, _agent_velocity: Vec3) -> f32 {
        self.movement_weight
    }

    fn transfer_weight(&self, _point: Vec3, _agent_velocity: Vec3) -> f32 {
        self.transfer_weight
    }

    fn avoid_transfer(&self) -> bool {
        self.avoid_transfer
    }

    fn should_attach(&self) -> bool {
        self.attach
    }
}

/// Fixed-window running average of vector samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedVector {
    samples: VecDeque<Vec3>,
    capacity: usize,
}

impl SmoothedVector {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Vec3) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean of the stored samples, zero when empty.
    pub fn average(&self) -> Vec3 {
        if self.samples.is_empty() {
            return Vec3::ZERO;
        }
        self.samples.iter().copied().sum::<Vec3>() / self.samples.len() as f32
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

}

/// Link between an agent and the support it stands on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportLink {
    pub support: ObjectHandle,

    /// Capability resolved at attach time.
    pub capability: SupportCapability,

    /// Whether the agent is carried along with the support.
    pub rides: bool,

    /// Agent position in the support's local frame.
    pub relative_position: Vec3,

    /// Agent rotation relative to the support's rotation.
    pub relative_rotation: Quat,

    /// Ground velocity computed on the last update.
    pub last_known_velocity: Vec3,
}

impl SupportLink {
    fn anchor(&mut self, support_pose: Pose, agent: Pose) {
        self.relative_position = support_pose.inverse_transform_point(agent.position);
        self.relative_rotation = support_pose.rotation.inverse() * agent.rotation;
    }
}

/// How far the support carried the agent since the last anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RideDelta {
    /// Translation to add to the agent position.
    pub displacement: Vec3,
    /// Rotation (about up) to pre-multiply onto the agent rotation.
    pub rotation: Quat,
}

impl RideDelta {
    /// Pose after applying the ride.
    pub fn apply(&self, pose: Pose) -> Pose {
        Pose::new(pose.position + self.displacement, (self.rotation * pose.rotation).normalize())
    }
}

/// Result of [`PlatformCoupler::follow`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FollowOutcome {
    /// Not attached, or attached to a support the agent doesn't ride.
    Free,
    /// Carried by the support.
    Ride(RideDelta),
    /// The support disappeared; the link was dropped.
    Lost { launch_velocity: Vec3 },
}

/// Result of [`PlatformCoupler::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CouplerEvent {
    /// Not on a support before or after.
    Idle,
    /// Linked to a new support.
    Attached(ObjectHandle),
    /// Still on the same support.
    Stayed(ObjectHandle),
    /// Left the support; the caller should adopt the launch velocity.
    Detached { launch_velocity: Vec3 },
}

/// Per-agent platform coupling state.
#[derive(Debug, Clone)]
pub struct PlatformCoupler {
    link: Option<SupportLink>,
    history: SmoothedVector,
    ground_velocity: Vec3,
}

impl PlatformCoupler {
    pub fn new(config: &KccConfig) -> Self {
        Self {
            link: None,
            history: SmoothedVector::new(config.launch_history_samples),
            ground_velocity: Vec3::ZERO,
        }
    }

    pub fn link(&self) -> Option<&SupportLink> {
        self.link.as_ref()
    }

    /// Velocity of the ground under the agent, as of the last update.
    pub fn ground_velocity(&self) -> Vec3 {
        self.ground_velocity
    }

    /// Smoothed velocity of the agent itself.
    pub fn smoothed_velocity(&self) -> Vec3 {
        self.history.average()
    }

    /// Link to `support`, resolving its capability once.
    pub fn attach<S: SupportSource + ?Sized>(
        &mut self,
        source: &S,
        support: ObjectHandle,
        agent: Pose,
    ) -> bool {
        let Some(support_pose) = source.support_pose(support) else {
            return false;
        };

        let capability = source.support_capability(support);
        let rides = match capability {
            SupportCapability::MovingGround => source
                .moving_ground(support)
                .map_or(true, |ground| ground.should_attach()),
            SupportCapability::Velocity | SupportCapability::Static => true,
        };

        let mut link = SupportLink {
            support,
            capability,
            rides,
            relative_position: Vec3::ZERO,
            relative_rotation: Quat::IDENTITY,
            last_known_velocity: Vec3::ZERO,
        };
        link.anchor(support_pose, agent);

        log::debug!("attached to support {support} ({capability:?}, rides={rides})");
        self.link = Some(link);
        true
    }

    /// Drop the link and return the capped launch velocity.
    pub fn detach(&mut self, config: &KccConfig) -> Option<Vec3> {
        let link = self.link.take()?;
        let launch_velocity = link
            .last_known_velocity
            .clamp_length_max(config.max_default_launch_velocity);
        self.ground_velocity = Vec3::ZERO;

        log::debug!(
            "detached from support {} with launch velocity {launch_velocity}",
            link.support
        );
        Some(launch_velocity)
    }

    /// How far the support moved the agent since the last update.
    pub fn follow<S: SupportSource + ?Sized>(
        &mut self,
        source: &S,
        agent: Pose,
        config: &KccConfig,
    ) -> FollowOutcome {
        let Some(link) = self.link else {
            return FollowOutcome::Free;
        };

        let Some(support_pose) = source.support_pose(link.support) else {
            log::debug!("support {} no longer exists", link.support);
            let launch_velocity = self.detach(config).unwrap_or(Vec3::ZERO);
            return FollowOutcome::Lost { launch_velocity };
        };

        if !link.rides {
            return FollowOutcome::Free;
        }

        let target = support_pose.transform_point(link.relative_position);
        let rotated = support_pose.rotation * link.relative_rotation;
        let rotation = twist_about(rotated * agent.rotation.inverse(), config.up);

        FollowOutcome::Ride(RideDelta {
            displacement: target - agent.position,
            rotation,
        })
    }

    /// Refresh the link after the agent moved this tick.
    ///
    /// `displacement` is everything the agent moved this tick (ride included);
    /// it feeds the history used for supports without a velocity.
    pub fn update<S: SupportSource + ?Sized>(
        &mut self,
        source: &S,
        grounded: &GroundedState,
        agent: Pose,
        displacement: Vec3,
        delta_time: f32,
        config: &KccConfig,
    ) -> CouplerEvent {
        if delta_time > 0.0 {
            self.history.push(displacement / delta_time);
        }

        let Some(support) = grounded.standing_support() else {
            return match self.detach(config) {
                Some(launch_velocity) => CouplerEvent::Detached { launch_velocity },
                None => CouplerEvent::Idle,
            };
        };

        let same_support = self.link.is_some_and(|link| link.support == support);
        if !same_support && !self.attach(source, support, agent) {
            return match self.detach(config) {
                Some(launch_velocity) => CouplerEvent::Detached { launch_velocity },
                None => CouplerEvent::Idle,
            };
        }

        let Some(link) = self.link else {
            return CouplerEvent::Idle;
        };
        let velocity = self.compute_ground_velocity(source, &link, grounded, config);
        let support_pose = source.support_pose(support);

        if let Some(link) = self.link.as_mut() {
            link.last_known_velocity = velocity;
            if let Some(support_pose) = support_pose {
                link.anchor(support_pose, agent);
            }
        }
        self.ground_velocity = velocity;

        if same_support {
            CouplerEvent::Stayed(support)
        } else {
            CouplerEvent::Attached(support)
        }
    }

    fn compute_ground_velocity<S: SupportSource + ?Sized>(
        &self,
        source: &S,
        link: &SupportLink,
        grounded: &GroundedState,
        config: &KccConfig,
    ) -> Vec3 {
        let point = grounded.ground_hit_position;
        let agent_velocity = self.history.average();

        match link.capability {
            SupportCapability::MovingGround => {
                let ground = source.moving_ground(link.support);
                let pose = source.support_pose(link.support);
                match (ground, pose) {
                    (Some(ground), _) if ground.avoid_transfer() => Vec3::ZERO,
                    (Some(ground), Some(pose)) => {
                        let movement =
                            ground.movement_weight(point, agent_velocity).clamp(0.0, 1.0);
                        let transfer =
                            ground.transfer_weight(point, agent_velocity).clamp(0.0, 1.0);
                        ground.velocity_at_point(&pose, point) * movement * transfer
                    }
                    _ => self.default_velocity(config),
                }
            }
            SupportCapability::Velocity => source
                .support_velocity_at(link.support, point)
                .unwrap_or_else(|| self.default_velocity(config)),
            SupportCapability::Static => self.default_velocity(config),
        }
    }

    /// Launch velocity for supports that don't report one.
    fn default_velocity(&self, config: &KccConfig) -> Vec3 {
        self.history
            .average()
            .clamp_length_max(config.max_default_launch_velocity)
    }
}
