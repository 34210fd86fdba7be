//! Collision world containing static and moving geometry.
//!
//! The world stores every collidable body and answers agent queries through
//! [`WorldCaster`], which binds one agent shape to the world and implements
//! [`ShapeCaster`]. Bodies can move between ticks (kinematic bodies and
//! platforms), which is what the platform coupler rides on.

use std::collections::BTreeSet;

use glam::{Quat, Vec3};
use parry3d::math::{Isometry, Point, Real, Vector};
use parry3d::na::{Quaternion, Translation3, UnitQuaternion};
use parry3d::query::{cast_shapes, contact, PointQuery, ShapeCastOptions};
use parry3d::shape::SharedShape;

use crate::error::CasterError;
use crate::movement::{MovingGround, SupportCapability, SupportSource};

use super::caster::{ObjectHandle, ShapeCaster, SweepHit};
use super::flags::ContentFlags;
use super::shape::{ColliderShape, Pose};

/// Contact resolution passes used by [`WorldCaster::push_out_of_overlap`].
const DEPENETRATION_ITERATIONS: usize = 4;

/// Extra separation added on top of the measured penetration depth.
const PUSH_EPSILON: f32 = 0.0005;

/// How a body moves between ticks.
#[derive(Debug, Default)]
pub enum BodyMotion {
    /// Never moves and has no velocity.
    #[default]
    Static,
    /// Moves with a fixed velocity and exposes it to agents standing on it.
    Kinematic {
        linear_velocity: Vec3,
        angular_velocity: Vec3,
    },
    /// Moving ground with its own transfer rules.
    Platform(Box<dyn MovingGround>),
}

/// A piece of collision geometry in the world.
#[derive(Debug)]
pub struct CollisionBody {
    pub handle: ObjectHandle,
    pub shape: SharedShape,
    pub pose: Pose,
    pub contents: ContentFlags,
    pub motion: BodyMotion,
}

/// The collision world containing all geometry.
///
/// Supports boxes (axis-aligned and oriented), spheres, capsules and convex
/// hulls. Queries are brute force over all bodies; worlds used by a single
/// agent tick are expected to be small or pre-culled by the caller.
#[derive(Debug, Default)]
pub struct CollisionWorld {
    bodies: Vec<CollisionBody>,
    next_id: u32,
}

impl CollisionWorld {
    /// Create an empty collision world.
    pub fn new() -> Self {
        Self {
            bodies: Vec::new(),
            next_id: 0,
        }
    }

    /// Add an axis-aligned box.
    ///
    /// # Arguments
    ///
    /// * `center` - Center position of the box in world space
    /// * `half_extents` - Half-size in each axis (x, y, z)
    /// * `contents` - Content flags for collision filtering
    pub fn add_box(
        &mut self,
        center: Vec3,
        half_extents: Vec3,
        contents: ContentFlags,
    ) -> ObjectHandle {
        self.add_oriented_box(Pose::at(center), half_extents, contents)
    }

    /// Add a box with an arbitrary orientation (slopes, ramps).
    pub fn add_oriented_box(
        &mut self,
        pose: Pose,
        half_extents: Vec3,
        contents: ContentFlags,
    ) -> ObjectHandle {
        let shape = SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z);
        self.insert(shape, pose, contents)
    }

    /// Add a sphere.
    pub fn add_sphere(
        &mut self,
        center: Vec3,
        radius: f32,
        contents: ContentFlags,
    ) -> ObjectHandle {
        self.insert(SharedShape::ball(radius), Pose::at(center), contents)
    }

    /// Add a body with the same shape vocabulary agents use (other agents, props).
    pub fn add_body(
        &mut self,
        shape: ColliderShape,
        pose: Pose,
        contents: ContentFlags,
    ) -> ObjectHandle {
        self.insert(to_shared_shape(shape), pose, contents)
    }

    /// Add a convex hull given in world space.
    ///
    /// Returns `None` if parry can't build a hull from the points (fewer than
    /// three points, or a degenerate mesh).
    pub fn add_convex_hull(
        &mut self,
        points: &[Vec3],
        contents: ContentFlags,
    ) -> Option<ObjectHandle> {
        let parry_points: Vec<Point<Real>> =
            points.iter().map(|p| Point::new(p.x, p.y, p.z)).collect();
        let shape = SharedShape::convex_hull(&parry_points)?;
        Some(self.insert(shape, Pose::IDENTITY, contents))
    }

    /// Change how a body moves. Returns `false` for unknown handles.
    pub fn set_motion(&mut self, handle: ObjectHandle, motion: BodyMotion) -> bool {
        match self.body_mut(handle) {
            Some(body) => {
                body.motion = motion;
                true
            }
            None => false,
        }
    }

    /// Teleport a body. Returns `false` for unknown handles.
    pub fn set_pose(&mut self, handle: ObjectHandle, pose: Pose) -> bool {
        match self.body_mut(handle) {
            Some(body) => {
                body.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Current pose of a body.
    pub fn pose(&self, handle: ObjectHandle) -> Option<Pose> {
        self.body(handle).map(|body| body.pose)
    }

    /// Remove a body. Agents riding it detach on their next tick.
    pub fn remove(&mut self, handle: ObjectHandle) -> bool {
        let before = self.bodies.len();
        self.bodies.retain(|body| body.handle != handle);
        self.bodies.len() != before
    }

    /// Remove all collision geometry.
    pub fn clear(&mut self) {
        self.bodies.clear();
    }

    /// Get the number of bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Advance kinematic bodies and platforms by their velocities.
    pub fn step(&mut self, delta_time: f32) {
        for body in &mut self.bodies {
            let (linear, angular) = match &body.motion {
                BodyMotion::Static => continue,
                BodyMotion::Kinematic {
                    linear_velocity,
                    angular_velocity,
                } => (*linear_velocity, *angular_velocity),
                BodyMotion::Platform(platform) => {
                    (platform.linear_velocity(), platform.angular_velocity())
                }
            };

            body.pose.position += linear * delta_time;
            if angular.length_squared() > 0.0 {
                body.pose.rotation =
                    (Quat::from_scaled_axis(angular * delta_time) * body.pose.rotation).normalize();
            }
        }
    }

    /// Bind an agent shape to this world.
    pub fn caster(&self, shape: ColliderShape, skin_width: f32) -> WorldCaster<'_> {
        WorldCaster {
            world: self,
            shape,
            parry_shape: to_shared_shape(shape),
            up: Vec3::Y,
            skin_width,
            mask: ContentFlags::MASK_AGENT_SOLID,
            ignore: None,
        }
    }

    fn insert(&mut self, shape: SharedShape, pose: Pose, contents: ContentFlags) -> ObjectHandle {
        let handle = ObjectHandle(self.next_id);
        self.next_id += 1;

        self.bodies.push(CollisionBody {
            handle,
            shape,
            pose,
            contents,
            motion: BodyMotion::Static,
        });

        handle
    }

    fn body(&self, handle: ObjectHandle) -> Option<&CollisionBody> {
        self.bodies.iter().find(|body| body.handle == handle)
    }

    fn body_mut(&mut self, handle: ObjectHandle) -> Option<&mut CollisionBody> {
        self.bodies.iter_mut().find(|body| body.handle == handle)
    }
}

impl SupportSource for CollisionWorld {
    fn support_pose(&self, handle: ObjectHandle) -> Option<Pose> {
        self.pose(handle)
    }

    fn support_capability(&self, handle: ObjectHandle) -> SupportCapability {
        match self.body(handle).map(|body| &body.motion) {
            Some(BodyMotion::Platform(_)) => SupportCapability::MovingGround,
            Some(BodyMotion::Kinematic { .. }) => SupportCapability::Velocity,
            Some(BodyMotion::Static) | None => SupportCapability::Static,
        }
    }

    fn moving_ground(&self, handle: ObjectHandle) -> Option<&dyn MovingGround> {
        match &self.body(handle)?.motion {
            BodyMotion::Platform(platform) => Some(platform.as_ref()),
            _ => None,
        }
    }

    fn support_velocity_at(&self, handle: ObjectHandle, point: Vec3) -> Option<Vec3> {
        let body = self.body(handle)?;
        match &body.motion {
            BodyMotion::Static => None,
            BodyMotion::Kinematic {
                linear_velocity,
                angular_velocity,
            } => Some(*linear_velocity + angular_velocity.cross(point - body.pose.position)),
            BodyMotion::Platform(platform) => Some(platform.velocity_at_point(&body.pose, point)),
        }
    }
}

/// One agent shape bound to a [`CollisionWorld`].
#[derive(Debug, Clone)]
pub struct WorldCaster<'w> {
    world: &'w CollisionWorld,
    shape: ColliderShape,
    parry_shape: SharedShape,
    up: Vec3,
    skin_width: f32,
    mask: ContentFlags,
    ignore: Option<ObjectHandle>,
}

/// How deep the agent sits inside one body.
#[derive(Debug, Clone, Copy)]
struct Penetration {
    depth: f32,
    /// Direction that moves the agent out of the body.
    normal: Vec3,
}

impl<'w> WorldCaster<'w> {
    /// Only collide with bodies whose contents intersect `mask`.
    pub fn with_mask(mut self, mask: ContentFlags) -> Self {
        self.mask = mask;
        self
    }

    /// Exclude the agent's own body from every query.
    pub fn ignoring(mut self, handle: ObjectHandle) -> Self {
        self.ignore = Some(handle);
        self
    }

    /// Up axis used by [`ShapeCaster::bottom_point`].
    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up.normalize_or_zero();
        self
    }

    fn candidates(&self) -> impl Iterator<Item = &'w CollisionBody> + '_ {
        self.world.bodies.iter().filter(move |body| {
            Some(body.handle) != self.ignore && self.mask.intersects(body.contents)
        })
    }

    /// Penetration of the agent at `pose` into `body`, if any.
    ///
    /// The contact query can report a separated pair for a capsule whose
    /// axis passes through a box centre, so a pair without a negative
    /// contact distance is measured again from the agent's core.
    fn penetration(
        &self,
        pose: Pose,
        body: &CollisionBody,
    ) -> Result<Option<Penetration>, CasterError> {
        let handle = body.handle;
        let found = contact(
            &to_isometry(pose),
            self.parry_shape.as_ref(),
            &to_isometry(body.pose),
            body.shape.as_ref(),
            0.0,
        )
        .map_err(|_| CasterError::UnsupportedShapePair { object: handle })?;

        // Negative dist means penetration
        match found {
            Some(found) if found.dist < 0.0 => Ok(Some(Penetration {
                depth: -found.dist,
                normal: from_vector(found.normal2.into_inner()),
            })),
            _ => Ok(self.core_penetration(pose, body)),
        }
    }

    /// Penetration measured from the agent's core segment (capsules) or
    /// centre (spheres), sampled at both ends and the middle.
    ///
    /// Boxes have no core and yield `None`.
    fn core_penetration(&self, pose: Pose, body: &CollisionBody) -> Option<Penetration> {
        let (half_segment, radius) = match self.shape {
            ColliderShape::Capsule { radius, height } => ((height * 0.5 - radius).max(0.0), radius),
            ColliderShape::Sphere { radius } => (0.0, radius),
            ColliderShape::Box { .. } => return None,
        };

        let axis = pose.rotation * Vec3::Y * half_segment;
        let body_iso = to_isometry(body.pose);

        [pose.position - axis, pose.position, pose.position + axis]
            .into_iter()
            .map(|core| {
                let projection = body
                    .shape
                    .project_point(&body_iso, &Point::new(core.x, core.y, core.z), false);
                let offset = core - from_point(projection.point);
                let distance = offset.length();

                // Inside the body the way out is towards its surface
                let (signed_distance, normal) = if projection.is_inside {
                    (-distance, -offset)
                } else {
                    (distance, offset)
                };

                Penetration {
                    depth: radius - signed_distance,
                    normal: normal.normalize_or_zero(),
                }
            })
            .max_by(|a, b| a.depth.total_cmp(&b.depth))
            .filter(|deepest| deepest.depth > 0.0 && deepest.normal != Vec3::ZERO)
    }
}

impl ShapeCaster for WorldCaster<'_> {
    fn sweep(
        &self,
        pose: Pose,
        direction: Vec3,
        max_distance: f32,
    ) -> Result<Option<SweepHit>, CasterError> {
        if !pose.is_finite() {
            return Err(CasterError::NonFinitePose(pose.position));
        }

        let dir = direction.normalize_or_zero();
        if dir == Vec3::ZERO || !(max_distance > 0.0) {
            return Ok(None);
        }

        let shape_iso = to_isometry(pose);
        let velocity = Vector::new(dir.x, dir.y, dir.z);
        let mut nearest: Option<SweepHit> = None;

        for body in self.candidates() {
            let body_iso = to_isometry(body.pose);
            let options = ShapeCastOptions {
                max_time_of_impact: max_distance,
                target_distance: 0.0,
                // Let shapes that start touching slide out instead of reporting a hit at 0
                stop_at_penetration: false,
                compute_impact_geometry_on_penetration: true,
            };

            let hit = cast_shapes(
                &shape_iso,
                &velocity,
                self.parry_shape.as_ref(),
                &body_iso,
                &Vector::zeros(),
                body.shape.as_ref(),
                options,
            )
            .map_err(|_| CasterError::UnsupportedShapePair { object: body.handle })?;

            let Some(hit) = hit else {
                continue;
            };

            let is_closer = nearest
                .as_ref()
                .map_or(true, |current| hit.time_of_impact < current.distance);
            if !is_closer {
                continue;
            }

            let normal = from_vector(body_iso.rotation * hit.normal2.into_inner());
            let normal = if normal.is_finite() && normal.length_squared() > 0.5 {
                normal.normalize()
            } else {
                -dir
            };

            nearest = Some(SweepHit {
                distance: hit.time_of_impact.max(0.0),
                point: from_point(body_iso * hit.witness2),
                normal,
                object: body.handle,
            });
        }

        Ok(nearest)
    }

    fn overlapping(&self, pose: Pose) -> Result<BTreeSet<ObjectHandle>, CasterError> {
        if !pose.is_finite() {
            return Err(CasterError::NonFinitePose(pose.position));
        }

        let mut overlaps = BTreeSet::new();

        for body in self.candidates() {
            // Contacts within the skin are resting contacts, not overlaps
            if let Some(penetration) = self.penetration(pose, body)? {
                if penetration.depth > self.skin_width {
                    overlaps.insert(body.handle);
                }
            }
        }

        Ok(overlaps)
    }

    fn push_out_of_overlap(&self, pose: Pose, max_distance: f32) -> Result<Vec3, CasterError> {
        if !pose.is_finite() {
            return Err(CasterError::NonFinitePose(pose.position));
        }
        if !(max_distance > 0.0) {
            return Ok(Vec3::ZERO);
        }

        let mut offset = Vec3::ZERO;

        for _ in 0..DEPENETRATION_ITERATIONS {
            let current = pose.translated(offset);
            let mut correction = Vec3::ZERO;

            for body in self.candidates() {
                if let Some(penetration) = self.penetration(current, body)? {
                    correction += penetration.normal * (penetration.depth + PUSH_EPSILON);
                }
            }

            if correction.length_squared() < 1e-12 {
                break;
            }
            offset += correction;
        }

        Ok(offset.clamp_length_max(max_distance))
    }

    fn bottom_point(&self, pose: Pose) -> Vec3 {
        self.shape.bottom_point(pose, self.up)
    }
}

// ============================================================================
// Conversions between glam and parry
// ============================================================================

fn to_shared_shape(shape: ColliderShape) -> SharedShape {
    match shape {
        ColliderShape::Capsule { radius, height } => {
            // Parry capsules are defined by the half-height of the cylinder part
            let segment_half_height = (height * 0.5 - radius).max(0.0);
            SharedShape::capsule_y(segment_half_height, radius)
        }
        ColliderShape::Box { half_extents } => {
            SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
        }
        ColliderShape::Sphere { radius } => SharedShape::ball(radius),
    }
}

fn to_isometry(pose: Pose) -> Isometry<Real> {
    let q = pose.rotation.normalize();
    Isometry::from_parts(
        Translation3::new(pose.position.x, pose.position.y, pose.position.z),
        UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z)),
    )
}

#[inline]
fn from_vector(v: Vector<Real>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

#[inline]
fn from_point(p: Point<Real>) -> Vec3 {
    Vec3::new(p.x, p.y, p.z)
}

// ============================================================================
// Tests
// ============================================================================
