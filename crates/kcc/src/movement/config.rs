//! Controller tuning.
//!
//! All parameters are grouped here for easy tuning. Distances are metres,
//! angles are degrees, velocities metres/second.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::math::angle_degrees;

/// Configuration for the bounce solver, ground checks and platform coupling.
///
/// The config is owned by the caller and only borrowed for the duration of a
/// call, so one instance can drive any number of agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KccConfig {
    // ========================================================================
    // Bounces
    // ========================================================================
    /// Hard cap on bounce and snap-up iterations per resolve.
    pub max_bounces: u32,

    /// Fraction of momentum kept on every bounce, before the angle factor.
    pub push_decay: f32,

    /// Exponent shaping how fast momentum drops as impacts get more head-on.
    /// `0.0` keeps the same momentum at all angles.
    pub angle_power: f32,

    /// Impact angle (away from a grazing contact) at which decay saturates.
    pub max_angle_shove: f32,

    /// Gap kept between the agent and any surface it touches.
    pub skin_width: f32,

    // ========================================================================
    // Stairs and Steps
    // ========================================================================
    /// Maximum rise the agent can step up without bouncing.
    pub vertical_snap_up: f32,

    /// Horizontal clearance required on top of a step.
    pub step_up_depth: f32,

    /// Maximum drop the agent sticks to when walking down slopes and stairs.
    pub vertical_snap_down: f32,

    // ========================================================================
    // Ground
    // ========================================================================
    /// World up axis (unit length).
    pub up: Vec3,

    /// Steepest surface, in degrees from `up`, the agent can stand on.
    pub max_walk_angle: f32,

    /// Ground closer than this counts as standing or sliding.
    pub grounded_distance: f32,

    /// Length of the downward ground probe.
    pub ground_check_distance: f32,

    // ========================================================================
    // Platforms and Depenetration
    // ========================================================================
    /// Cap on the launch velocity inherited from ground without its own velocity.
    pub max_default_launch_velocity: f32,

    /// Speed at which the agent is pushed out of overlapping geometry.
    pub max_push_speed: f32,

    /// Number of displacement samples averaged for the default launch velocity.
    pub launch_history_samples: usize,
}

impl Default for KccConfig {
    fn default() -> Self {
        Self {
            // Bounces
            max_bounces: 5,
            push_decay: 0.9,
            angle_power: 0.5,
            max_angle_shove: 90.0,
            skin_width: 0.01,

            // Steps
            vertical_snap_up: 0.3,
            step_up_depth: 0.1,
            vertical_snap_down: 0.2,

            // Ground
            up: Vec3::Y,
            max_walk_angle: 60.0,
            grounded_distance: 0.05,
            ground_check_distance: 0.25,

            // Platforms
            max_default_launch_velocity: 5.0,
            max_push_speed: 10.0,
            launch_history_samples: 10,
        }
    }
}

impl KccConfig {
    /// Snappier stepping and more bounces, for fast arcade characters.
    pub fn responsive() -> Self {
        Self {
            max_bounces: 8,
            push_decay: 1.0,
            angle_power: 0.25,
            vertical_snap_up: 0.45,
            step_up_depth: 0.3,
            vertical_snap_down: 0.35,
            max_default_launch_velocity: 10.0,
            ..Default::default()
        }
    }

    /// Conservative stepping and strong impact decay, for slow characters.
    pub fn careful() -> Self {
        Self {
            max_bounces: 4,
            push_decay: 0.8,
            angle_power: 1.0,
            vertical_snap_up: 0.2,
            step_up_depth: 0.15,
            max_walk_angle: 45.0,
            max_default_launch_velocity: 3.0,
            ..Default::default()
        }
    }

    /// Check every value against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bounces == 0 {
            return Err(ConfigError::ZeroBounces);
        }
        if !(self.skin_width > 0.0) {
            return Err(ConfigError::NonPositiveSkinWidth(self.skin_width));
        }
        if !self.up.is_finite() || (self.up.length() - 1.0).abs() > 1e-3 {
            return Err(ConfigError::UpAxisNotNormalized(self.up));
        }
        if self.launch_history_samples == 0 {
            return Err(ConfigError::OutOfRange {
                field: "launch_history_samples",
                value: 0.0,
            });
        }

        check_range("push_decay", self.push_decay, 0.0, 1.0)?;
        check_range("angle_power", self.angle_power, 0.0, f32::MAX)?;
        check_range("max_angle_shove", self.max_angle_shove, f32::EPSILON, 180.0)?;
        check_range("vertical_snap_up", self.vertical_snap_up, 0.0, f32::MAX)?;
        check_range("step_up_depth", self.step_up_depth, 0.0, f32::MAX)?;
        check_range("vertical_snap_down", self.vertical_snap_down, 0.0, f32::MAX)?;
        check_range("max_walk_angle", self.max_walk_angle, 0.0, 90.0)?;
        check_range("grounded_distance", self.grounded_distance, 0.0, f32::MAX)?;
        check_range("ground_check_distance", self.ground_check_distance, 0.0, f32::MAX)?;
        check_range(
            "max_default_launch_velocity",
            self.max_default_launch_velocity,
            0.0,
            f32::MAX,
        )?;
        check_range("max_push_speed", self.max_push_speed, 0.0, f32::MAX)?;
        Ok(())
    }

    /// Angle of a surface normal from the up axis, in degrees.
    #[inline]
    pub fn surface_angle(&self, normal: Vec3) -> f32 {
        angle_degrees(normal, self.up)
    }

    /// Whether a surface with this normal can be stood on.
    #[inline]
    pub fn is_walkable(&self, normal: Vec3) -> bool {
        self.surface_angle(normal) <= self.max_walk_angle
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(KccConfig::default().validate(), Ok(()));
        assert_eq!(KccConfig::responsive().validate(), Ok(()));
        assert_eq!(KccConfig::careful().validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = KccConfig {
            max_bounces: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBounces));

        let config = KccConfig {
            push_decay: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "push_decay", .. })
        ));

        let config = KccConfig {
            up: Vec3::new(0.0, 2.0, 0.0),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UpAxisNotNormalized(_))));

        let config = KccConfig {
            skin_width: 0.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveSkinWidth(0.0)));
    }

    #[test]
    fn test_walkable() {
        let config = KccConfig::default();
        assert!(config.is_walkable(Vec3::Y));
        assert!(config.is_walkable(Vec3::new(0.0, 1.0, 1.0).normalize()));
        assert!(!config.is_walkable(Vec3::X));
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let document = r#"{ "max_bounces": 3, "up": [0.0, 0.0, 1.0] }"#;
        let config: KccConfig = serde_json::from_str(document).unwrap();
        assert_eq!(config.max_bounces, 3);
        assert_eq!(config.up, Vec3::Z);
        assert_eq!(config.skin_width, KccConfig::default().skin_width);
        assert_eq!(config.validate(), Ok(()));
    }
}
