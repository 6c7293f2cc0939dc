#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![doc = "A `no_std` library for micromouse pose and motion kinematics."]
#![doc = ""]
#![doc = "This crate provides maze-frame pose types measured in cell units, the cardinal"]
#![doc = "direction tables, differential-drive odometry integration and jerk-limited"]
#![doc = "velocity profiles."]

use core::fmt;
use libm::{ceil, cos, fabs, floor, sin};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod config;
pub mod direction;
pub mod error;
pub mod math;
pub mod profile;

pub use config::RobotConfig;
pub use direction::{Axis, Direction};
pub use error::KinematicsError;
pub use math::{wrap_angle, yaw_diff};
pub use profile::{ProfileLimits, VelocityProfile, distance_needed, ramp_time};

/// Wheel speeds below this (cu/s) count as stopped, and wheel speed differences
/// below it count as driving straight.
pub const SPEED_EPSILON: f64 = 1e-5;

/// A pose `(col, row, yaw)` in the maze frame, in cell units and radians.
///
/// `col` grows eastward, `row` grows southward and yaw is measured from `+col`
/// toward `+row`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlobalPose {
    /// Column coordinate (cu).
    pub col: f64,
    /// Row coordinate (cu).
    pub row: f64,
    /// Heading (rad), wrapped to `[-PI, PI)` after every update.
    pub yaw: f64,
}

impl GlobalPose {
    /// Construct a new pose.
    pub const fn new(col: f64, row: f64, yaw: f64) -> Self {
        GlobalPose { col, row, yaw }
    }

    /// The coordinate along `axis`.
    pub const fn axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Col => self.col,
            Axis::Row => self.row,
        }
    }

    /// Overwrite the coordinate along `axis`.
    pub fn set_axis(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::Col => self.col = value,
            Axis::Row => self.row = value,
        }
    }

    /// Index of the column the pose lies in.
    pub fn cell_col(&self) -> usize {
        floor(self.col).max(0.0) as usize
    }

    /// Index of the row the pose lies in.
    pub fn cell_row(&self) -> usize {
        floor(self.row).max(0.0) as usize
    }

    /// Add an increment produced by the integrator, wrapping the yaw.
    pub fn accumulate(&mut self, delta: GlobalPose) {
        self.col += delta.col;
        self.row += delta.row;
        self.yaw = wrap_angle(self.yaw + delta.yaw);
    }

    /// Distance driven forward from `start` while facing `facing`.
    pub fn forward_disp_from(&self, start: GlobalPose, facing: Direction) -> f64 {
        let axis = facing.forward_axis();
        facing.forward_sign() * (self.axis(axis) - start.axis(axis))
    }

    /// Signed distance ahead to the next cell edge while facing `facing`.
    pub fn disp_to_next_edge(&self, facing: Direction) -> f64 {
        let a = self.axis(facing.forward_axis());
        if facing.forward_sign() < 0.0 {
            a - floor(a)
        } else {
            floor(a) + 1.0 - a
        }
    }

    /// Signed distance ahead to the `n`th cell edge; `n = 1` is the next edge.
    pub fn disp_to_nth_edge(&self, facing: Direction, n: u32) -> f64 {
        self.disp_to_next_edge(facing) + f64::from(n) - 1.0
    }

    /// How far the pose sits toward the robot's left of the cell's center line while facing `facing`.
    pub fn left_offset_from_center(&self, facing: Direction) -> f64 {
        let a = self.axis(facing.lateral_axis());
        facing.left_sign() * (a - (floor(a) + 0.5))
    }

    /// The pose reached by driving along the current yaw up to the `n`th edge ahead.
    pub fn pose_at_nth_edge(&self, facing: Direction, n: u32) -> GlobalPose {
        let disp = self.disp_to_nth_edge(facing, n);
        GlobalPose {
            col: self.col + cos(self.yaw) * disp,
            row: self.row + sin(self.yaw) * disp,
            yaw: self.yaw,
        }
    }
}

impl fmt::Display for GlobalPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(col: {:.3}, row: {:.3}, yaw: {:.3} rad)", self.col, self.row, self.yaw)
    }
}

/// Pose relative to the boundaries of the occupied cell, for a given facing direction.
///
/// Derived from a [`GlobalPose`] on demand, never stored.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalPose {
    /// Distance from the cell edge behind the robot (cu).
    pub to_back: f64,
    /// Sideways position inside the cell (cu).
    pub to_left: f64,
    /// Heading error relative to the facing direction (rad).
    pub yaw_from_straight: f64,
}

impl LocalPose {
    /// Derive the local pose of `pose` while facing `facing`.
    ///
    /// Both coordinates round toward the same edge: headings whose forward axis
    /// shrinks (north, west) measure up from the ceiling, the others down from the floor.
    pub fn from_global(pose: GlobalPose, facing: Direction) -> Self {
        let from_edge = |a: f64| {
            if facing.forward_sign() < 0.0 {
                ceil(a) - a
            } else {
                a - floor(a)
            }
        };
        LocalPose {
            to_back: from_edge(pose.axis(facing.forward_axis())),
            to_left: from_edge(pose.axis(facing.lateral_axis())),
            yaw_from_straight: math::yaw_diff(facing.yaw(), pose.yaw),
        }
    }

    /// Sideways offset from the cell center.
    pub fn sideways_disp_to_center(&self) -> f64 {
        self.to_left - 0.5
    }

    /// Forward distance still to drive to reach the cell center.
    pub fn fwd_disp_to_center(&self) -> f64 {
        0.5 - self.to_back
    }
}

impl fmt::Display for LocalPose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(to_back: {:.3}, to_left: {:.3}, yaw_from_straight: {:.3} rad)",
            self.to_back, self.to_left, self.yaw_from_straight
        )
    }
}

/// One snapshot of the seven distance sensors, in meters.
///
/// A sensor that sees nothing reads its maximum range.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RangeData {
    /// Forward-facing sensor.
    pub front: f64,
    /// Left side sensor near the nose.
    pub front_left: f64,
    /// Right side sensor near the nose.
    pub front_right: f64,
    /// Left side sensor near the tail.
    pub back_left: f64,
    /// Right side sensor near the tail.
    pub back_right: f64,
    /// Left drop-off sensor, looking diagonally ahead.
    pub gerald_left: f64,
    /// Right drop-off sensor, looking diagonally ahead.
    pub gerald_right: f64,
}

impl RangeData {
    /// A snapshot in which no sensor detects anything.
    pub const fn clear(max_range: f64) -> Self {
        RangeData {
            front: max_range,
            front_left: max_range,
            front_right: max_range,
            back_left: max_range,
            back_right: max_range,
            gerald_left: max_range,
            gerald_right: max_range,
        }
    }

    /// Replace negative, non-finite and out-of-range readings by `max_range`.
    pub fn sanitized(&self, max_range: f64) -> Self {
        let fix = |d: f64| if d.is_finite() && d >= 0.0 && d <= max_range { d } else { max_range };
        RangeData {
            front: fix(self.front),
            front_left: fix(self.front_left),
            front_right: fix(self.front_right),
            back_left: fix(self.back_left),
            back_right: fix(self.back_right),
            gerald_left: fix(self.gerald_left),
            gerald_right: fix(self.gerald_right),
        }
    }
}

/// Differential-drive odometry in cell units.
///
/// This struct holds the track width of the chassis and integrates wheel speeds
/// into pose increments using the closed-form arc about the instantaneous
/// center of curvature.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DifferentialDrive {
    /// Track width (cu).
    track_width_cu: f64,
}

impl DifferentialDrive {
    /// Construct a new differential-drive integrator.
    ///
    /// # Arguments
    ///
    /// * `track_width_cu`: Distance between the wheel contact points, in cell units.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidTrackWidth)` if `track_width_cu` is not positive.
    pub const fn new(track_width_cu: f64) -> Result<Self, KinematicsError> {
        if !(track_width_cu > 0.0) {
            return Err(KinematicsError::InvalidTrackWidth("must be positive"));
        }
        Ok(DifferentialDrive { track_width_cu })
    }

    /// Construct the integrator for a robot configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::InvalidTrackWidth)` if the configured track width is not positive.
    pub fn from_config(config: &RobotConfig) -> Result<Self, KinematicsError> {
        Self::new(config.track_width_cu())
    }

    /// Returns the track width in cell units.
    pub fn track_width_cu(&self) -> f64 {
        self.track_width_cu
    }

    /// Pose increment produced by driving the wheels at `v_left`/`v_right` (cu/s)
    /// for `dt` seconds, starting at heading `yaw`.
    ///
    /// Stopped wheels produce no motion at all, and equal wheel speeds take the
    /// straight-line branch instead of the arc formula, whose radius diverges there.
    /// The returned yaw increment is not wrapped; [`GlobalPose::accumulate`] wraps the sum.
    pub fn integrate(&self, v_left: f64, v_right: f64, yaw: f64, dt: f64) -> GlobalPose {
        if fabs(v_left) < SPEED_EPSILON && fabs(v_right) < SPEED_EPSILON {
            return GlobalPose::default();
        }

        if fabs(v_left - v_right) < SPEED_EPSILON {
            let v = (v_left + v_right) / 2.0;
            return GlobalPose {
                col: dt * v * cos(yaw),
                row: dt * v * sin(yaw),
                yaw: 0.0,
            };
        }

        let yaw_rate = (v_left - v_right) / self.track_width_cu;
        let radius = self.track_width_cu * (v_right + v_left) / (2.0 * (v_left - v_right));
        let d_yaw = yaw_rate * dt;
        GlobalPose {
            col: radius * (sin(yaw + d_yaw) - sin(yaw)),
            row: -radius * (cos(yaw + d_yaw) - cos(yaw)),
            yaw: d_yaw,
        }
    }

    /// Integrate wheel speeds over `dt` and return the new pose.
    ///
    /// # Errors
    ///
    /// Returns `Err(KinematicsError::NegativeTimeDelta)` if `dt` is negative or not finite.
    pub fn update_pose(
        &self,
        current_pose: GlobalPose,
        v_left: f64,
        v_right: f64,
        dt: f64,
    ) -> Result<GlobalPose, KinematicsError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(KinematicsError::NegativeTimeDelta("must be finite and non-negative"));
        }
        let mut pose = current_pose;
        pose.accumulate(self.integrate(v_left, v_right, current_pose.yaw, dt));
        Ok(pose)
    }
}

impl fmt::Display for DifferentialDrive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DifferentialDrive (T: {:.3} cu)", self.track_width_cu)
    }
}
