//! Physical constants of the robot and the maze, and unit conversions.
//!
//! Swapping between the simulated and the physical robot is a matter of
//! swapping the [`RobotConfig`] value, never the algorithms that consume it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::KinematicsError;

/// Robot and maze geometry. Distances are meters, angles radians, speeds m/s.
///
/// Sensor mounting offsets are given in the robot frame: `x` forward and `y`
/// toward the sensor's side, so the left and right side sensors share one set
/// of offsets and angles.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobotConfig {
    /// Width of one maze cell, wall center to wall center.
    pub unit_dist: f64,
    /// Thickness of a maze wall.
    pub wall_thickness: f64,
    /// Drive wheel radius.
    pub wheel_radius: f64,
    /// Distance between the two drive wheel contact points.
    pub track_width: f64,
    /// Angle of the front side sensors' rays, measured from forward toward their side.
    pub front_analog_angle: f64,
    /// Angle of the back side sensors' rays, measured from forward toward their side.
    pub back_analog_angle: f64,
    /// Forward offset of the front side sensors.
    pub front_side_analog_x: f64,
    /// Sideways offset of the front side sensors.
    pub front_side_analog_y: f64,
    /// Forward offset of the back side sensors.
    pub back_side_analog_x: f64,
    /// Sideways offset of the back side sensors.
    pub back_side_analog_y: f64,
    /// Forward offset of the forward-facing sensor.
    pub front_analog_x: f64,
    /// Forward offset of the drop-off ("gerald") sensors.
    pub gerald_x: f64,
    /// Sideways offset of the drop-off sensors.
    pub gerald_y: f64,
    /// Angle of the drop-off sensors' rays away from the side normal, toward forward.
    pub gerald_angle: f64,
    /// A drop-off reading above this means the side wall ends ahead.
    pub gerald_wall_threshold: f64,
    /// Fraction of the geometric drop-off distance that is still trusted.
    pub drop_safety: f64,
    /// Both side sensors must read below this for a side wall to be sensed.
    pub side_wall_threshold: f64,
    /// A forward reading below this re-anchors the along-axis coordinate.
    pub front_wall_threshold: f64,
    /// Largest cycle-to-cycle change of a side reading that still counts as the same wall.
    pub wall_changed_threshold: f64,
    /// Maximum range of the distance sensors; also the "no detection" reading.
    pub analog_max_dist: f64,
    /// Heading error accepted as aligned at the end of a turn.
    pub rot_tolerance: f64,
    /// Cruise speed of straight drives.
    pub max_speed: f64,
    /// Wheel speed below which a turn may finish.
    pub min_speed: f64,
    /// Speed at the end of a straight drive.
    pub forward_end_speed: f64,
    /// Jerk magnitude used by velocity profiles, in cell units per second cubed.
    pub jerk_cupsss: f64,
    /// Largest force command a wheel actuator may emit.
    pub max_force: f64,
}

impl RobotConfig {
    /// Constants of the simulated robot.
    pub const SIM: RobotConfig = RobotConfig {
        unit_dist: 0.18,
        wall_thickness: 0.012,
        wheel_radius: 0.0145,
        track_width: 0.0633,
        front_analog_angle: 1.35255,
        back_analog_angle: 1.35255,
        front_side_analog_x: 0.045,
        front_side_analog_y: 0.030,
        back_side_analog_x: -0.024,
        back_side_analog_y: 0.030,
        front_analog_x: 0.055,
        gerald_x: 0.040,
        gerald_y: 0.020,
        gerald_angle: 0.87,
        gerald_wall_threshold: 0.15,
        drop_safety: 0.8,
        side_wall_threshold: 0.08,
        front_wall_threshold: 0.08,
        wall_changed_threshold: 0.02,
        analog_max_dist: 0.18,
        rot_tolerance: 0.14,
        max_speed: 0.18,
        min_speed: 0.018,
        forward_end_speed: 0.0,
        jerk_cupsss: 20.0,
        max_force: 0.013,
    };

    /// Constants of the physical robot.
    pub const REAL: RobotConfig = RobotConfig {
        front_side_analog_x: 0.042,
        front_side_analog_y: 0.0350,
        back_side_analog_x: -0.0206,
        back_side_analog_y: 0.0335,
        front_analog_x: 0.056,
        min_speed: 0.023,
        wall_changed_threshold: 0.01,
        max_force: 0.016,
        ..RobotConfig::SIM
    };

    /// Check that the geometry is physically meaningful.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidTrackWidth)` or `Err(KinematicsError::InvalidWheelRadius)`
    /// for a non-positive drive geometry, and `Err(KinematicsError::InvalidConfig)` for any other
    /// non-positive length, threshold or limit.
    pub fn validate(&self) -> Result<(), KinematicsError> {
        if !(self.track_width > 0.0) {
            return Err(KinematicsError::InvalidTrackWidth("must be positive"));
        }
        if !(self.wheel_radius > 0.0) {
            return Err(KinematicsError::InvalidWheelRadius("must be positive"));
        }
        if !(self.unit_dist > 0.0) {
            return Err(KinematicsError::InvalidConfig("unit_dist must be positive"));
        }
        if !(self.wall_thickness >= 0.0) || self.wall_thickness >= self.unit_dist {
            return Err(KinematicsError::InvalidConfig(
                "wall_thickness must be non-negative and less than unit_dist",
            ));
        }
        if !(self.side_wall_threshold > 0.0)
            || !(self.front_wall_threshold > 0.0)
            || !(self.wall_changed_threshold > 0.0)
            || !(self.gerald_wall_threshold > 0.0)
        {
            return Err(KinematicsError::InvalidConfig("sensor thresholds must be positive"));
        }
        if !(self.analog_max_dist > 0.0) {
            return Err(KinematicsError::InvalidConfig("analog_max_dist must be positive"));
        }
        if !(self.max_speed > 0.0) || !(self.jerk_cupsss > 0.0) || !(self.max_force > 0.0) {
            return Err(KinematicsError::InvalidConfig(
                "max_speed, jerk_cupsss and max_force must be positive",
            ));
        }
        Ok(())
    }

    /// Convert meters into cell units.
    pub fn to_cell_units(&self, meters: f64) -> f64 {
        meters / self.unit_dist
    }

    /// Convert cell units into meters.
    pub fn to_meters(&self, cu: f64) -> f64 {
        cu * self.unit_dist
    }

    /// Distance rolled by a wheel turning through `rad`, in cell units.
    pub fn rad_to_cu(&self, rad: f64) -> f64 {
        self.to_cell_units(rad * self.wheel_radius)
    }

    /// Wheel rotation needed to roll `cu` cell units.
    pub fn cu_to_rad(&self, cu: f64) -> f64 {
        self.to_meters(cu) / self.wheel_radius
    }

    /// Track width in cell units.
    pub fn track_width_cu(&self) -> f64 {
        self.to_cell_units(self.track_width)
    }

    /// Half a wall thickness in meters.
    pub fn half_wall_thickness(&self) -> f64 {
        self.wall_thickness / 2.0
    }

    /// Half a wall thickness in cell units.
    pub fn half_wall_thickness_cu(&self) -> f64 {
        self.to_cell_units(self.half_wall_thickness())
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        RobotConfig::SIM
    }
}
