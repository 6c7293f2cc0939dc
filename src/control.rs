//! The fixed-rate control thread: plant, kernel and the active motion, one tick at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use smartmouse_control::{ActiveMotion, KinematicController, MotionRequest, SteeringGains, WallSide};
use smartmouse_kinematics::{Direction, GlobalPose};
use smartmouse_motor::RegulatedMotor;
use spin_sleep::SpinSleeper;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{info, trace, warn};

use crate::blackboard::{Blackboard, is_shutdown, raise_fault};
use crate::bus::Topic;
use crate::config::AppConfig;
use crate::sim::{CorridorMaze, CorridorPlant};

/// What one tick produced, published on the telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Telemetry {
    pub tick: u64,
    pub pose: GlobalPose,
    pub truth: GlobalPose,
    pub facing: Direction,
    pub forces: (f64, f64),
    pub fusion_side: Option<WallSide>,
    pub active: Option<MotionRequest>,
    pub completed: usize,
}

pub struct ControlLoop {
    ctrl: KinematicController<RegulatedMotor>,
    plant: CorridorPlant,
    maze: CorridorMaze,
    steering: SteeringGains,
    active: Option<(MotionRequest, ActiveMotion, u64)>,
    completed: usize,
    tick: u64,
    dt_s: f64,
}

impl ControlLoop {
    /// Kernel and plant both start at the center of the start cell.
    pub fn new(app: &AppConfig, facing: Direction) -> anyhow::Result<Self> {
        let start = GlobalPose::new(
            app.mission.start_col as f64 + 0.5,
            app.mission.start_row as f64 + 0.5,
            facing.yaw(),
        );
        let mut ctrl = KinematicController::regulated(app.robot, app.pid)?;
        ctrl.reset_col_to(start.col);
        ctrl.reset_row_to(start.row);
        ctrl.reset_yaw_to(start.yaw);
        Ok(ControlLoop {
            ctrl,
            plant: CorridorPlant::new(app.robot, app.sim.clone(), start)?,
            maze: CorridorMaze::new(&app.sim, facing, app.mission.start_col),
            steering: app.steering,
            active: None,
            completed: 0,
            tick: 0,
            dt_s: Duration::from_micros(app.timing.period_us).as_secs_f64(),
        })
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    /// Run one tick; `request` is only taken up when no motion is active.
    pub fn cycle(&mut self, request: Option<MotionRequest>) -> Telemetry {
        if let Some(request) = request.filter(|_| self.is_idle()) {
            match ActiveMotion::start(request, &mut self.ctrl, self.maze.facing, self.steering) {
                Ok(motion) => self.active = Some((request, motion, self.tick)),
                Err(err) => {
                    warn!(%err, ?request, "Rejected motion request");
                    self.completed += 1;
                }
            }
        }
        if let Some((_, motion, started)) = &self.active {
            let t_s = (self.tick - started) as f64 * self.dt_s;
            motion.execute(&mut self.ctrl, t_s);
        }

        let range = self.plant.range_data();
        let (left_angle, right_angle) = self.plant.wheel_angles();
        self.maze.locate(self.ctrl.global_pose());
        let forces = self.ctrl.step(self.dt_s, left_angle, right_angle, &range, &self.maze);
        self.plant.advance(self.dt_s, forces);

        if let Some((request, motion, _)) = self.active {
            if motion.is_finished(&self.ctrl) {
                self.maze.facing = motion.finish(&mut self.ctrl, self.maze.facing);
                self.active = None;
                self.completed += 1;
                info!(?request, completed = self.completed, "Motion request done");
            }
        }

        let telemetry = Telemetry {
            tick: self.tick,
            pose: self.ctrl.global_pose(),
            truth: self.plant.truth(),
            facing: self.maze.facing,
            forces,
            fusion_side: self.ctrl.last_fusion().and_then(|f| f.side),
            active: self.active.map(|(request, _, _)| request),
            completed: self.completed,
        };
        trace!(?telemetry, "Tick");
        self.tick += 1;
        telemetry
    }

    /// Tick at `period` until shutdown is requested.
    pub fn run(
        mut self,
        bb: &Blackboard,
        mut requests: broadcast::Receiver<Arc<MotionRequest>>,
        telemetry: &Topic<Telemetry>,
        period: Duration,
    ) -> anyhow::Result<()> {
        info!(?period, "Control thread started.");
        let sleeper = SpinSleeper::new(1_000);
        while !is_shutdown(bb) {
            let started = Instant::now();
            let request = if self.is_idle() { Self::next_request(&mut requests, bb)? } else { None };
            let report = self.cycle(request);

            {
                let mut g = bb.write();
                g.pose = report.pose;
                g.truth = report.truth;
                g.facing = report.facing;
                g.active = report.active;
                g.completed = report.completed;
                g.ticks = report.tick;
                g.last_tick_ts = Instant::now();
            }
            telemetry.publish(report);

            let elapsed = started.elapsed();
            if elapsed < period {
                sleeper.sleep(period - elapsed);
            } else {
                trace!(?elapsed, "Tick overran its period");
            }
        }
        info!(ticks = self.tick, "Control thread stopped.");
        Ok(())
    }

    fn next_request(
        requests: &mut broadcast::Receiver<Arc<MotionRequest>>,
        bb: &Blackboard,
    ) -> anyhow::Result<Option<MotionRequest>> {
        match requests.try_recv() {
            Ok(request) => Ok(Some(*request)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(skipped)) => {
                raise_fault(bb, "motion requests dropped");
                anyhow::bail!("control thread missed {skipped} motion requests")
            }
            // mission finished publishing; keep holding position until shutdown
            Err(TryRecvError::Closed) => Ok(None),
        }
    }

    pub fn controller(&self) -> &KinematicController<RegulatedMotor> {
        &self.ctrl
    }

    pub fn plant(&self) -> &CorridorPlant {
        &self.plant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissionConfig;

    fn app() -> AppConfig {
        AppConfig {
            mission: MissionConfig { start_col: 0, start_row: 0, start_facing: "E".into(), requests: Vec::new() },
            ..AppConfig::default()
        }
    }

    fn run_request(control: &mut ControlLoop, request: MotionRequest) -> u64 {
        let start = control.cycle(Some(request)).tick;
        for _ in 0..20_000 {
            let report = control.cycle(None);
            if control.is_idle() {
                return report.tick - start;
            }
        }
        panic!("{request:?} did not finish");
    }

    #[test]
    fn test_first_tick_commands_zero() {
        let mut control = ControlLoop::new(&app(), Direction::E).unwrap();
        let report = control.cycle(None);
        assert_eq!(report.forces, (0.0, 0.0));
        assert_eq!(report.pose, GlobalPose::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn test_forward_two_cells_in_corridor() {
        let mut control = ControlLoop::new(&app(), Direction::E).unwrap();
        control.cycle(None);
        run_request(&mut control, MotionRequest::Forward(2));

        let pose = control.controller().global_pose();
        let truth = control.plant().truth();
        assert!(pose.col >= 2.0, "{}", pose);
        assert!((pose.col - truth.col).abs() < 0.05, "{} vs {}", pose, truth);
        assert!((truth.row - 0.5).abs() < 0.1, "{}", truth);
        assert_eq!(control.completed, 1);
    }

    #[test]
    fn test_turn_updates_facing() {
        let mut control = ControlLoop::new(&app(), Direction::E).unwrap();
        control.cycle(None);
        run_request(&mut control, MotionRequest::Turn(Direction::S));
        let report = control.cycle(None);
        assert_eq!(report.facing, Direction::S);
        assert!(report.pose.yaw > 1.0);
    }

    #[test]
    fn test_rejected_request_counts_as_done() {
        let mut control = ControlLoop::new(&app(), Direction::E).unwrap();
        let report = control.cycle(Some(MotionRequest::Forward(0)));
        assert!(control.is_idle());
        assert_eq!(report.completed, 1);
    }
}
