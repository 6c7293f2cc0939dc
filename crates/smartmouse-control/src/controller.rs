//! The per-cycle orchestrator: odometry, wall correction, then wheel control.

use smartmouse_kinematics::{DifferentialDrive, Direction, GlobalPose, LocalPose, RangeData, RobotConfig, wrap_angle};
use smartmouse_motor::{PidGains, RegulatedMotor, WheelActuator};
use tracing::{debug, info, trace, warn};

use crate::error::ControlError;
use crate::fusion::{DropDistance, FusionEstimate, SensorFusion, WallSenseHistory};
use crate::maze::MazeState;

/// Owns the pose estimate and drives two wheel actuators.
///
/// The controller is driven by [`KinematicController::step`] once per control
/// tick. It never blocks and never allocates; a single thread is expected to
/// own it.
#[derive(Debug, Clone)]
pub struct KinematicController<A: WheelActuator> {
    config: RobotConfig,
    drive: DifferentialDrive,
    fusion: SensorFusion,
    pose: GlobalPose,
    left: A,
    right: A,
    initialized: bool,
    enabled: bool,
    kinematics_enabled: bool,
    sensor_pose_estimate_enabled: bool,
    dt_s: f64,
    last_fusion: Option<FusionEstimate>,
}

impl KinematicController<RegulatedMotor> {
    /// A controller driving two [`RegulatedMotor`]s with the same gains.
    ///
    /// # Errors
    ///
    /// Returns `Err(ControlError::Kinematics)` if the configuration is rejected.
    pub fn regulated(config: RobotConfig, gains: PidGains) -> Result<Self, ControlError> {
        let left = RegulatedMotor::new(&config, gains);
        let right = RegulatedMotor::new(&config, gains);
        Self::new(config, left, right)
    }
}

impl<A: WheelActuator> KinematicController<A> {
    /// Build a controller at pose `(0, 0, 0)`, waiting for its warm-up cycle.
    ///
    /// # Errors
    ///
    /// Returns `Err(ControlError::Kinematics)` if the configuration is rejected.
    pub fn new(config: RobotConfig, left: A, right: A) -> Result<Self, ControlError> {
        config.validate()?;
        let drive = DifferentialDrive::from_config(&config)?;
        info!(%drive, unit_dist = config.unit_dist, "Kinematic controller created");
        Ok(KinematicController {
            fusion: SensorFusion::new(config),
            config,
            drive,
            pose: GlobalPose::default(),
            left,
            right,
            initialized: false,
            enabled: true,
            kinematics_enabled: true,
            sensor_pose_estimate_enabled: true,
            dt_s: 0.0,
            last_fusion: None,
        })
    }

    /// Run one control cycle and return the `(left, right)` force commands.
    ///
    /// The first cycle after construction or [`reset`](Self::reset) only arms the
    /// controller and commands zero, whether or not the controller is enabled. `left_angle_rad`/`right_angle_rad` are the
    /// wheel angles measured this cycle.
    pub fn step(
        &mut self,
        dt_s: f64,
        left_angle_rad: f64,
        right_angle_rad: f64,
        range: &RangeData,
        maze: &impl MazeState,
    ) -> (f64, f64) {
        if !self.initialized {
            self.initialized = true;
            debug!("Warm-up cycle, no odometry");
            return (0.0, 0.0);
        }
        if !self.enabled {
            return (0.0, 0.0);
        }
        self.dt_s = dt_s;

        if self.kinematics_enabled {
            let (v_left, v_right) = self.wheel_velocities_cps();
            match self.drive.update_pose(self.pose, v_left, v_right, dt_s) {
                Ok(pose) => self.pose = pose,
                Err(err) => warn!(%err, dt_s, "Skipping odometry update"),
            }

            // history and drop distance track every cycle, only the overwrite is optional
            let facing = maze.facing();
            let range = range.sanitized(self.config.analog_max_dist);
            let estimate = self.fusion.estimate(&range, facing, |dir| maze.is_wall_in_direction(dir));
            if self.sensor_pose_estimate_enabled {
                let update = self.fusion.anchor(&mut self.pose, &estimate, &range, facing);
                if update.forward {
                    trace!(pose = %self.pose, "Re-anchored on front wall");
                }
                self.last_fusion = Some(estimate);
            }
        }

        let left_cmd = self.left.run_pid(dt_s, left_angle_rad);
        let right_cmd = self.right.run_pid(dt_s, right_angle_rad);
        trace!(pose = %self.pose, left_cmd, right_cmd, "Control cycle");
        (left_cmd, right_cmd)
    }

    /// Current pose estimate.
    pub fn global_pose(&self) -> GlobalPose {
        self.pose
    }

    /// Pose relative to the occupied cell while facing `facing`.
    pub fn local_pose(&self, facing: Direction) -> LocalPose {
        LocalPose::from_global(self.pose, facing)
    }

    /// Overwrite the column coordinate.
    pub fn reset_col_to(&mut self, col: f64) {
        debug!(col, "Resetting column");
        self.pose.col = col;
    }

    /// Overwrite the row coordinate.
    pub fn reset_row_to(&mut self, row: f64) {
        debug!(row, "Resetting row");
        self.pose.row = row;
    }

    /// Overwrite the yaw, wrapping it.
    pub fn reset_yaw_to(&mut self, yaw: f64) {
        debug!(yaw, "Resetting yaw");
        self.pose.yaw = wrap_angle(yaw);
    }

    /// Forward distance travelled since `start` while facing `facing` (cu).
    pub fn fwd_disp(&self, facing: Direction, start: GlobalPose) -> f64 {
        self.pose.forward_disp_from(start, facing)
    }

    /// Distance to the next cell edge ahead (cu).
    pub fn disp_to_next_edge(&self, facing: Direction) -> f64 {
        self.pose.disp_to_next_edge(facing)
    }

    /// Distance to the `n`th cell edge ahead (cu); `n = 1` is the next one.
    pub fn disp_to_nth_edge(&self, facing: Direction, n: u32) -> f64 {
        self.pose.disp_to_nth_edge(facing, n)
    }

    /// Pose reached by driving along the current yaw to the `n`th edge ahead.
    pub fn pose_at_nth_edge(&self, facing: Direction, n: u32) -> GlobalPose {
        self.pose.pose_at_nth_edge(facing, n)
    }

    /// Sideways correction toward the cell center while facing `facing` (cu).
    pub fn sideways_disp_to_center(&self, facing: Direction) -> f64 {
        self.local_pose(facing).sideways_disp_to_center()
    }

    /// Forward correction toward the cell center while facing `facing` (cu).
    pub fn fwd_disp_to_center(&self, facing: Direction) -> f64 {
        self.local_pose(facing).fwd_disp_to_center()
    }

    /// Command wheel surface speeds (cu/s).
    pub fn set_speed_cps(&mut self, left_cps: f64, right_cps: f64) {
        self.left.set_setpoint_cps(left_cps);
        self.right.set_setpoint_cps(right_cps);
    }

    /// Limit how fast both wheel setpoints may change (cu/s^2).
    pub fn set_acceleration_cpss(&mut self, acceleration_cpss: f64) {
        self.left.set_acceleration_cpss(acceleration_cpss);
        self.right.set_acceleration_cpss(acceleration_cpss);
    }

    /// Replace both wheels' speed loop gains.
    pub fn set_pid_params(&mut self, gains: PidGains) {
        self.left.set_params(gains);
        self.right.set_params(gains);
    }

    /// Whether both wheels have stopped.
    pub fn is_stopped(&self) -> bool {
        self.left.is_stopped() && self.right.is_stopped()
    }

    /// Measured `(left, right)` wheel surface speeds (cu/s).
    pub fn wheel_velocities_cps(&self) -> (f64, f64) {
        (
            self.config.rad_to_cu(self.left.velocity_rps()),
            self.config.rad_to_cu(self.right.velocity_rps()),
        )
    }

    /// Mean of the wheel speeds (cu/s).
    pub fn current_forward_speed_cups(&self) -> f64 {
        let (l, r) = self.wheel_velocities_cps();
        (l + r) / 2.0
    }

    /// Enable or bypass the whole controller. A disabled controller keeps its pose.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Enable or skip odometry and wall correction; the wheel loops keep running.
    pub fn set_kinematics_enabled(&mut self, enabled: bool) {
        self.kinematics_enabled = enabled;
    }

    /// Enable or skip the wall correction.
    ///
    /// The side-sensor history and drop distance keep updating while it is off.
    pub fn set_sensor_pose_estimate_enabled(&mut self, enabled: bool) {
        self.sensor_pose_estimate_enabled = enabled;
    }

    /// Whether the wall correction runs.
    pub fn sensor_pose_estimate_enabled(&self) -> bool {
        self.sensor_pose_estimate_enabled
    }

    /// Make the next [`step`](Self::step) a warm-up cycle again. The pose is kept.
    pub fn reset(&mut self) {
        info!(pose = %self.pose, "Controller reset");
        self.initialized = false;
        self.dt_s = 0.0;
        self.last_fusion = None;
    }

    /// Side readings kept from the previous cycle.
    pub fn wall_history(&self) -> WallSenseHistory {
        self.fusion.history()
    }

    /// Replace the side readings of the previous cycle.
    pub fn set_wall_history(&mut self, history: WallSenseHistory) {
        self.fusion.set_history(history);
    }

    /// Latest drop-off distances.
    pub fn drop_distance(&self) -> DropDistance {
        self.fusion.drop_distance()
    }

    /// dt of the last cycle that ran past warm-up (s).
    pub fn cycle_dt_s(&self) -> f64 {
        self.dt_s
    }

    /// Outcome of the last wall correction pass.
    pub fn last_fusion(&self) -> Option<FusionEstimate> {
        self.last_fusion
    }

    /// Left wheel actuator.
    pub fn left_motor(&self) -> &A {
        &self.left
    }

    /// Right wheel actuator.
    pub fn right_motor(&self) -> &A {
        &self.right
    }

    /// Robot constants in use.
    pub fn config(&self) -> &RobotConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::WallSide;
    use crate::maze::CellWalls;
    use smartmouse_kinematics::KinematicsError;
    use smartmouse_motor::ActuatorState;
    const EPSILON: f64 = 1e-9;

    #[derive(Debug, Default)]
    struct FakeWheel {
        velocity_rps: f64,
        setpoint_cps: f64,
        acceleration_cpss: f64,
        gains: Option<PidGains>,
        pid_calls: usize,
        force: f64,
    }

    impl WheelActuator for FakeWheel {
        fn velocity_rps(&self) -> f64 {
            self.velocity_rps
        }

        fn run_pid(&mut self, _dt_s: f64, _angle_rad: f64) -> f64 {
            self.pid_calls += 1;
            self.force
        }

        fn set_acceleration_cpss(&mut self, acceleration_cpss: f64) {
            self.acceleration_cpss = acceleration_cpss;
        }

        fn set_setpoint_cps(&mut self, setpoint_cps: f64) {
            self.setpoint_cps = setpoint_cps;
        }

        fn set_params(&mut self, gains: PidGains) {
            self.gains = Some(gains);
        }

        fn is_stopped(&self) -> bool {
            self.velocity_rps.abs() < 0.05
        }

        fn state(&self) -> ActuatorState {
            ActuatorState {
                velocity_rps: self.velocity_rps,
                setpoint_rps: RobotConfig::SIM.cu_to_rad(self.setpoint_cps),
                force: self.force,
                stopped: self.is_stopped(),
            }
        }
    }

    fn wheel(velocity_rps: f64) -> FakeWheel {
        FakeWheel { velocity_rps, force: 0.004, ..FakeWheel::default() }
    }

    fn controller(v_left: f64, v_right: f64) -> KinematicController<FakeWheel> {
        KinematicController::new(RobotConfig::SIM, wheel(v_left), wheel(v_right)).unwrap()
    }

    fn open_cell() -> CellWalls {
        CellWalls::open(Direction::E, 0, 0)
    }

    fn no_walls() -> RangeData {
        RangeData::clear(RobotConfig::SIM.analog_max_dist)
    }

    #[test]
    fn test_warm_up_cycle() {
        let mut ctrl = controller(10.0, 12.0);
        let out = ctrl.step(0.01, 1.0, 2.0, &no_walls(), &open_cell());
        assert_eq!(out, (0.0, 0.0));
        assert_eq!(ctrl.global_pose(), GlobalPose::default());
        assert_eq!(ctrl.left_motor().pid_calls, 0);

        let out = ctrl.step(0.01, 1.0, 2.0, &no_walls(), &open_cell());
        assert_eq!(out, (0.004, 0.004));
        assert_ne!(ctrl.global_pose(), GlobalPose::default());
        assert!((ctrl.cycle_dt_s() - 0.01).abs() < EPSILON);
    }

    #[test]
    fn test_zero_motion_keeps_pose() {
        let mut ctrl = controller(0.0, 0.0);
        ctrl.reset_col_to(1.5);
        ctrl.reset_row_to(2.5);
        ctrl.reset_yaw_to(0.3);
        let start = ctrl.global_pose();
        for dt in [0.001, 0.01, 0.5, 2.0] {
            ctrl.step(dt, 0.0, 0.0, &no_walls(), &open_cell());
        }
        let end = ctrl.global_pose();
        assert!((end.col - start.col).abs() < EPSILON);
        assert!((end.row - start.row).abs() < EPSILON);
        assert!((end.yaw - start.yaw).abs() < EPSILON);
    }

    #[test]
    fn test_straight_odometry() {
        let config = RobotConfig::SIM;
        let mut ctrl = controller(8.0, 8.0);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        let expected = config.rad_to_cu(8.0) * 0.01;
        assert!((ctrl.global_pose().col - expected).abs() < EPSILON);
        assert!(ctrl.global_pose().row.abs() < EPSILON);
        assert!((ctrl.current_forward_speed_cups() - config.rad_to_cu(8.0)).abs() < EPSILON);
    }

    #[test]
    fn test_disabled_controller_commands_zero() {
        let mut ctrl = controller(8.0, 4.0);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        ctrl.set_enabled(false);
        for _ in 0..5 {
            assert_eq!(ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell()), (0.0, 0.0));
        }
        assert_eq!(ctrl.global_pose(), GlobalPose::default());
        assert_eq!(ctrl.left_motor().pid_calls, 0);
    }

    #[test]
    fn test_kinematics_disabled_still_runs_pid() {
        let mut ctrl = controller(8.0, 4.0);
        ctrl.set_kinematics_enabled(false);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        let out = ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        assert_eq!(out, (0.004, 0.004));
        assert_eq!(ctrl.global_pose(), GlobalPose::default());
        assert_eq!(ctrl.right_motor().pid_calls, 1);
        assert!(ctrl.last_fusion().is_none());
    }

    #[test]
    fn test_reset_rearms_warm_up() {
        let mut ctrl = controller(8.0, 8.0);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        let pose = ctrl.global_pose();
        ctrl.reset();
        assert_eq!(ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell()), (0.0, 0.0));
        assert_eq!(ctrl.global_pose(), pose);
    }

    #[test]
    fn test_side_wall_reanchors_lateral_axis() {
        let config = RobotConfig::SIM;
        let mut ctrl = controller(0.0, 0.0);
        ctrl.reset_col_to(0.4);
        ctrl.reset_row_to(0.7);
        ctrl.reset_yaw_to(0.02);

        // facing east centered in row 0 with both walls present
        let center_face = config.unit_dist / 2.0 - config.half_wall_thickness();
        let sensor_reach = (center_face - config.front_side_analog_y) / config.front_analog_angle.sin();
        let back_reach = (center_face - config.back_side_analog_y) / config.back_analog_angle.sin();
        let range = RangeData {
            front_left: sensor_reach,
            front_right: sensor_reach,
            back_left: back_reach,
            back_right: back_reach,
            gerald_left: 0.1,
            gerald_right: 0.1,
            ..no_walls()
        };
        ctrl.set_wall_history(WallSenseHistory::from_range(&range));
        let cell = open_cell().with_wall(Direction::N, true).with_wall(Direction::S, true);

        ctrl.step(0.01, 0.0, 0.0, &range, &cell);
        ctrl.step(0.01, 0.0, 0.0, &range, &cell);

        let fusion = ctrl.last_fusion().unwrap();
        assert_eq!(fusion.side, Some(WallSide::Right));
        let pose = ctrl.global_pose();
        assert!((pose.row - 0.5).abs() < 1e-6);
        assert!(pose.yaw.abs() < 1e-6);
        assert!((pose.col - 0.4).abs() < EPSILON);
    }

    #[test]
    fn test_fusion_can_be_disabled() {
        let mut ctrl = controller(0.0, 0.0);
        ctrl.set_sensor_pose_estimate_enabled(false);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        assert!(ctrl.last_fusion().is_none());
        assert!(!ctrl.sensor_pose_estimate_enabled());
    }

    #[test]
    fn test_history_tracks_readings_while_fusion_disabled() {
        let mut ctrl = controller(0.0, 0.0);
        ctrl.set_sensor_pose_estimate_enabled(false);
        let mut range = no_walls();
        range.front_left = 0.05;
        range.front_right = 0.05;
        range.back_left = 0.05;
        range.back_right = 0.05;
        let walls = open_cell().with_wall(Direction::N, true).with_wall(Direction::S, true);
        for _ in 0..10 {
            ctrl.step(0.01, 0.0, 0.0, &range, &walls);
        }
        assert_eq!(ctrl.wall_history(), WallSenseHistory::from_range(&range));
        assert_eq!(ctrl.global_pose(), GlobalPose::default());
        assert!(ctrl.last_fusion().is_none());
    }

    #[test]
    fn test_warm_up_runs_while_disabled() {
        let mut ctrl = controller(8.0, 8.0);
        ctrl.set_enabled(false);
        assert_eq!(ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell()), (0.0, 0.0));
        ctrl.set_enabled(true);
        let out = ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        assert_eq!(out, (0.004, 0.004));
        assert_ne!(ctrl.global_pose(), GlobalPose::default());
    }

    #[test]
    fn test_non_finite_dt_keeps_pose() {
        let mut ctrl = controller(8.0, 8.0);
        ctrl.step(0.01, 0.0, 0.0, &no_walls(), &open_cell());
        ctrl.step(0.01, 0.1, 0.1, &no_walls(), &open_cell());
        let pose = ctrl.global_pose();
        ctrl.step(f64::NAN, 0.2, 0.2, &no_walls(), &open_cell());
        assert_eq!(ctrl.global_pose(), pose);
        for _ in 0..5 {
            ctrl.step(0.01, 0.2, 0.2, &no_walls(), &open_cell());
        }
        let pose = ctrl.global_pose();
        assert!(pose.col.is_finite() && pose.row.is_finite() && pose.yaw.is_finite(), "{}", pose);
        assert!(pose.col > 0.0);
    }

    #[test]
    fn test_pass_through_to_wheels() {
        let mut ctrl = controller(0.0, 0.0);
        ctrl.set_speed_cps(0.5, -0.5);
        ctrl.set_acceleration_cpss(3.0);
        let gains = PidGains { kp: 1.0, ..PidGains::default() };
        ctrl.set_pid_params(gains);
        assert_eq!(ctrl.left_motor().setpoint_cps, 0.5);
        assert_eq!(ctrl.right_motor().setpoint_cps, -0.5);
        assert_eq!(ctrl.right_motor().acceleration_cpss, 3.0);
        assert_eq!(ctrl.left_motor().gains, Some(gains));
        let state = ctrl.left_motor().state();
        assert!((state.setpoint_rps - RobotConfig::SIM.cu_to_rad(0.5)).abs() < EPSILON);
        assert_eq!(state.force, 0.004);
    }

    #[test]
    fn test_is_stopped_checks_both_wheels() {
        assert!(controller(0.0, 0.0).is_stopped());
        assert!(!controller(0.0, 3.0).is_stopped());
        assert!(!controller(3.0, 0.0).is_stopped());
    }

    #[test]
    fn test_geometric_queries() {
        let mut ctrl = controller(0.0, 0.0);
        ctrl.reset_col_to(2.0);
        ctrl.reset_row_to(3.25);
        ctrl.reset_yaw_to(Direction::N.yaw());
        let local = ctrl.local_pose(Direction::N);
        assert!((local.to_back - 0.75).abs() < EPSILON);
        assert!(local.to_left.abs() < EPSILON);
        assert!((ctrl.disp_to_next_edge(Direction::N) - 0.25).abs() < EPSILON);
        assert!((ctrl.disp_to_nth_edge(Direction::N, 3) - 2.25).abs() < EPSILON);
        let edge = ctrl.pose_at_nth_edge(Direction::N, 1);
        assert!((edge.row - 3.0).abs() < EPSILON);
        assert!((ctrl.fwd_disp_to_center(Direction::N) + 0.25).abs() < EPSILON);
        assert!((ctrl.sideways_disp_to_center(Direction::N) + 0.5).abs() < EPSILON);

        let start = ctrl.global_pose();
        ctrl.reset_row_to(2.5);
        assert!((ctrl.fwd_disp(Direction::N, start) - 0.75).abs() < EPSILON);
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let config = RobotConfig { track_width: 0.0, ..RobotConfig::SIM };
        let err = KinematicController::new(config, wheel(0.0), wheel(0.0)).unwrap_err();
        assert!(matches!(err, ControlError::Kinematics(KinematicsError::InvalidTrackWidth(_))));
    }
}
