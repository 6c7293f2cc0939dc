//! Straight drives and in-place turns built on velocity profiles.
//!
//! A behavior is started from the controller's current state, then queried
//! every tick for wheel speeds until it reports that it is finished.

use smartmouse_kinematics::{Direction, GlobalPose, ProfileLimits, VelocityProfile, yaw_diff};
use smartmouse_motor::WheelActuator;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::controller::KinematicController;
use crate::error::ControlError;

/// Yaw rate per radian of heading error once a turn's profile has run out (1/s).
const TURN_TRIM_GAIN: f64 = 2.0;

/// Gains of the steering correction added on top of a straight drive's profile.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringGains {
    /// Differential wheel speed per radian of heading error (cu/s).
    pub kp_yaw: f64,
    /// Differential wheel speed per cell unit off the cell's center line (1/s).
    pub kp_lateral: f64,
}

impl Default for SteeringGains {
    fn default() -> Self {
        SteeringGains { kp_yaw: 0.5, kp_lateral: 1.0 }
    }
}

fn profile_limits<A: WheelActuator>(ctrl: &KinematicController<A>) -> ProfileLimits {
    let config = ctrl.config();
    ProfileLimits::new(config.to_cell_units(config.max_speed), config.jerk_cupsss)
}

/// Drive forward along the facing direction up to the `n`th cell edge ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveStraight {
    facing: Direction,
    start: GlobalPose,
    profile: VelocityProfile,
    creep_cps: f64,
    gains: SteeringGains,
}

impl DriveStraight {
    /// Plan a drive from the current pose and speed to the `n`th edge ahead.
    ///
    /// # Errors
    ///
    /// Returns `Err(ControlError::InvalidEdgeCount)` if `n` is zero, and
    /// `Err(ControlError::Kinematics)` if the profile limits are rejected.
    pub fn new<A: WheelActuator>(
        ctrl: &KinematicController<A>,
        facing: Direction,
        n: u32,
        gains: SteeringGains,
    ) -> Result<Self, ControlError> {
        if n == 0 {
            return Err(ControlError::InvalidEdgeCount("must drive to at least the next edge"));
        }
        let config = ctrl.config();
        let start = ctrl.global_pose();
        let goal_disp = ctrl.disp_to_nth_edge(facing, n);
        let v0 = ctrl.current_forward_speed_cups();
        let vf = config.to_cell_units(config.forward_end_speed);
        let profile = VelocityProfile::new(start, goal_disp, v0, vf, profile_limits(ctrl))?;
        debug!(%facing, n, goal_disp, v0, vf, peak = profile.peak_speed(), "Planned straight drive");
        Ok(DriveStraight {
            facing,
            start,
            profile,
            creep_cps: vf.max(config.to_cell_units(config.min_speed)),
            gains,
        })
    }

    /// Forward distance still to cover (cu).
    pub fn disp_error<A: WheelActuator>(&self, ctrl: &KinematicController<A>) -> f64 {
        self.profile.goal_disp() - ctrl.fwd_disp(self.facing, self.start)
    }

    /// `(left, right)` wheel speeds `t_s` seconds into the drive (cu/s).
    ///
    /// Past the end of the profile the robot creeps on until the goal is reached.
    pub fn wheel_velocities<A: WheelActuator>(&self, ctrl: &KinematicController<A>, t_s: f64) -> (f64, f64) {
        let mut v = self.profile.compute_forward_velocity(t_s);
        if t_s >= self.profile.duration() && self.disp_error(ctrl) > 0.0 {
            v = v.max(self.creep_cps);
        }
        let pose = ctrl.global_pose();
        let yaw_error = yaw_diff(pose.yaw, self.facing.yaw());
        let correction =
            self.gains.kp_yaw * yaw_error + self.gains.kp_lateral * pose.left_offset_from_center(self.facing);
        (v + correction, v - correction)
    }

    /// Whether the goal edge has been reached.
    pub fn is_finished<A: WheelActuator>(&self, ctrl: &KinematicController<A>) -> bool {
        self.disp_error(ctrl) <= 0.0
    }

    /// Direction of travel.
    pub fn facing(&self) -> Direction {
        self.facing
    }

    /// The planned speed law.
    pub fn profile(&self) -> &VelocityProfile {
        &self.profile
    }
}

/// Rotate on the spot until facing `goal`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnInPlace {
    goal: Direction,
    turn_sign: f64,
    left: VelocityProfile,
    right: VelocityProfile,
}

impl TurnInPlace {
    /// Plan a turn from the current heading to `goal`.
    ///
    /// Each wheel gets its own profile over the arc it has to roll. A wheel
    /// already rolling with the turn starts its profile at that speed. A wheel
    /// rolling against it is planned from rest, so its command steps to zero and
    /// the actuator's acceleration limit absorbs the reversal.
    ///
    /// # Errors
    ///
    /// Returns `Err(ControlError::Kinematics)` if the profile limits are rejected.
    pub fn new<A: WheelActuator>(ctrl: &KinematicController<A>, goal: Direction) -> Result<Self, ControlError> {
        let start = ctrl.global_pose();
        let yaw_error = yaw_diff(start.yaw, goal.yaw());
        let arc = yaw_error.abs() * ctrl.config().track_width_cu() / 2.0;
        // positive yaw error: left wheel forward, right wheel backward
        let turn_sign = if yaw_error < 0.0 { -1.0 } else { 1.0 };
        let (v_left, v_right) = ctrl.wheel_velocities_cps();
        let limits = profile_limits(ctrl);
        let left = VelocityProfile::new(start, arc, turn_sign * v_left, 0.0, limits)?;
        let right = VelocityProfile::new(start, arc, -turn_sign * v_right, 0.0, limits)?;
        debug!(%goal, yaw_error, arc, "Planned turn in place");
        Ok(TurnInPlace { goal, turn_sign, left, right })
    }

    /// Heading error left to turn (rad).
    pub fn yaw_error<A: WheelActuator>(&self, ctrl: &KinematicController<A>) -> f64 {
        yaw_diff(ctrl.global_pose().yaw, self.goal.yaw())
    }

    /// `(left, right)` wheel speeds `t_s` seconds into the turn (cu/s).
    ///
    /// Once both profiles have run out the remaining heading error is trimmed
    /// proportionally.
    pub fn wheel_velocities<A: WheelActuator>(&self, ctrl: &KinematicController<A>, t_s: f64) -> (f64, f64) {
        if t_s < self.left.duration().max(self.right.duration()) {
            let v_left = self.turn_sign * self.left.compute_forward_velocity(t_s);
            let v_right = -self.turn_sign * self.right.compute_forward_velocity(t_s);
            return (v_left, v_right);
        }
        let v = TURN_TRIM_GAIN * self.yaw_error(ctrl) * ctrl.config().track_width_cu() / 2.0;
        (v, -v)
    }

    /// Whether the heading is within tolerance and both wheels have slowed down.
    pub fn is_finished<A: WheelActuator>(&self, ctrl: &KinematicController<A>) -> bool {
        let config = ctrl.config();
        let min_speed = config.to_cell_units(config.min_speed);
        let (v_left, v_right) = ctrl.wheel_velocities_cps();
        self.yaw_error(ctrl).abs() < config.rot_tolerance && v_left.abs() < min_speed && v_right.abs() < min_speed
    }

    /// Heading the turn ends at.
    pub fn goal(&self) -> Direction {
        self.goal
    }
}

/// A motion the robot can be asked to perform.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionRequest {
    /// Drive forward to the `n`th cell edge ahead.
    Forward(u32),
    /// Turn in place to face a direction.
    Turn(Direction),
    /// Command zero speed and wait for both wheels to stop.
    Stop,
}

/// A started [`MotionRequest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveMotion {
    /// A straight drive in progress.
    Forward(DriveStraight),
    /// A turn in progress.
    Turn(TurnInPlace),
    /// Stopping.
    Stop,
}

impl ActiveMotion {
    /// Start `request` from the controller's current state.
    ///
    /// Wall correction runs during straight drives and is paused during turns,
    /// where the side walls sweep past the sensors.
    ///
    /// # Errors
    ///
    /// Returns the error of the behavior's planner.
    pub fn start<A: WheelActuator>(
        request: MotionRequest,
        ctrl: &mut KinematicController<A>,
        facing: Direction,
        gains: SteeringGains,
    ) -> Result<Self, ControlError> {
        info!(?request, %facing, pose = %ctrl.global_pose(), "Starting motion");
        Ok(match request {
            MotionRequest::Forward(n) => {
                ctrl.set_sensor_pose_estimate_enabled(true);
                ActiveMotion::Forward(DriveStraight::new(ctrl, facing, n, gains)?)
            }
            MotionRequest::Turn(goal) => {
                ctrl.set_sensor_pose_estimate_enabled(false);
                ActiveMotion::Turn(TurnInPlace::new(ctrl, goal)?)
            }
            MotionRequest::Stop => ActiveMotion::Stop,
        })
    }

    /// Command the wheel speeds for `t_s` seconds into the motion.
    pub fn execute<A: WheelActuator>(&self, ctrl: &mut KinematicController<A>, t_s: f64) {
        let (left, right) = match self {
            ActiveMotion::Forward(drive) => drive.wheel_velocities(ctrl, t_s),
            ActiveMotion::Turn(turn) => turn.wheel_velocities(ctrl, t_s),
            ActiveMotion::Stop => (0.0, 0.0),
        };
        ctrl.set_speed_cps(left, right);
    }

    /// Whether the motion is complete.
    pub fn is_finished<A: WheelActuator>(&self, ctrl: &KinematicController<A>) -> bool {
        match self {
            ActiveMotion::Forward(drive) => drive.is_finished(ctrl),
            ActiveMotion::Turn(turn) => turn.is_finished(ctrl),
            ActiveMotion::Stop => ctrl.is_stopped(),
        }
    }

    /// Wrap up the motion and return the direction the robot now faces.
    pub fn finish<A: WheelActuator>(&self, ctrl: &mut KinematicController<A>, facing: Direction) -> Direction {
        let facing = match self {
            ActiveMotion::Forward(drive) => {
                let vf = drive.profile().compute_forward_velocity(f64::INFINITY);
                ctrl.set_speed_cps(vf, vf);
                facing
            }
            ActiveMotion::Turn(turn) => {
                ctrl.set_speed_cps(0.0, 0.0);
                ctrl.set_sensor_pose_estimate_enabled(true);
                turn.goal()
            }
            ActiveMotion::Stop => facing,
        };
        info!(%facing, pose = %ctrl.global_pose(), "Motion finished");
        facing
    }
}
