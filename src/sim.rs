//! A straight corridor, one cell wide and closed at both ends, for the kernel to drive in.

use smartmouse_control::MazeState;
use smartmouse_kinematics::{DifferentialDrive, Direction, GlobalPose, RangeData, RobotConfig};

use crate::config::SimConfig;

/// Ground truth of the robot and its wheels.
#[derive(Debug, Clone)]
pub struct CorridorPlant {
    robot: RobotConfig,
    sim: SimConfig,
    drive: DifferentialDrive,
    truth: GlobalPose,
    wheel_angle_rad: [f64; 2],
    wheel_speed_rps: [f64; 2],
}

impl CorridorPlant {
    pub fn new(robot: RobotConfig, sim: SimConfig, start: GlobalPose) -> anyhow::Result<Self> {
        let drive = DifferentialDrive::from_config(&robot)?;
        Ok(CorridorPlant {
            robot,
            sim,
            drive,
            truth: start,
            wheel_angle_rad: [0.0; 2],
            wheel_speed_rps: [0.0; 2],
        })
    }

    pub fn truth(&self) -> GlobalPose {
        self.truth
    }

    /// `(left, right)` encoder angles (rad).
    pub fn wheel_angles(&self) -> (f64, f64) {
        (self.wheel_angle_rad[0], self.wheel_angle_rad[1])
    }

    /// Apply `(left, right)` forces for `dt_s` seconds.
    pub fn advance(&mut self, dt_s: f64, forces: (f64, f64)) {
        if !(dt_s > 0.0) {
            return;
        }
        let alpha = 1.0 - (-dt_s / self.sim.motor_time_constant_s).exp();
        for (i, force) in [forces.0, forces.1].into_iter().enumerate() {
            let target = self.sim.motor_gain * force;
            self.wheel_speed_rps[i] += alpha * (target - self.wheel_speed_rps[i]);
            self.wheel_angle_rad[i] += self.wheel_speed_rps[i] * dt_s;
        }
        let v_left = self.robot.rad_to_cu(self.wheel_speed_rps[0]);
        let v_right = self.robot.rad_to_cu(self.wheel_speed_rps[1]) * self.sim.right_wheel_slip;
        let delta = self.drive.integrate(v_left, v_right, self.truth.yaw, dt_s);
        self.truth.accumulate(delta);
    }

    /// What the seven distance sensors read at the true pose.
    pub fn range_data(&self) -> RangeData {
        let r = &self.robot;
        let (sin, cos) = self.truth.yaw.sin_cos();
        let forward = (cos, sin);
        let left = (sin, -cos);
        let right = (-sin, cos);
        let side = |x: f64, y: f64, angle: f64, toward: (f64, f64)| {
            let origin = self.body_point(x, y, forward, toward);
            let dir = combine(angle.cos(), forward, angle.sin(), toward);
            self.cast(origin, dir)
        };
        let gerald = |toward: (f64, f64)| {
            let origin = self.body_point(r.gerald_x, r.gerald_y, forward, toward);
            let dir = combine(r.gerald_angle.sin(), forward, r.gerald_angle.cos(), toward);
            self.cast(origin, dir)
        };

        RangeData {
            front: self.cast(self.body_point(r.front_analog_x, 0.0, forward, left), forward),
            front_left: side(r.front_side_analog_x, r.front_side_analog_y, r.front_analog_angle, left),
            front_right: side(r.front_side_analog_x, r.front_side_analog_y, r.front_analog_angle, right),
            back_left: side(r.back_side_analog_x, r.back_side_analog_y, r.back_analog_angle, left),
            back_right: side(r.back_side_analog_x, r.back_side_analog_y, r.back_analog_angle, right),
            gerald_left: gerald(left),
            gerald_right: gerald(right),
        }
    }

    /// Maze-frame point (m) at `x` forward and `y` toward `side` of the robot center.
    fn body_point(&self, x: f64, y: f64, forward: (f64, f64), side: (f64, f64)) -> (f64, f64) {
        let u = self.robot.unit_dist;
        let center = (self.truth.col * u, self.truth.row * u);
        (center.0 + x * forward.0 + y * side.0, center.1 + x * forward.1 + y * side.1)
    }

    /// Distance (m) from `origin` along `dir` to the first wall face, capped at the sensor range.
    fn cast(&self, origin: (f64, f64), dir: (f64, f64)) -> f64 {
        let u = self.robot.unit_dist;
        let hw = self.robot.half_wall_thickness();
        let row = self.sim.corridor_row as f64;
        let x_faces = (hw, self.sim.corridor_cells as f64 * u - hw);
        let y_faces = (row * u + hw, (row + 1.0) * u - hw);

        let hit = |o: f64, d: f64, (lo, hi): (f64, f64)| -> f64 {
            if d > f64::EPSILON {
                (hi - o) / d
            } else if d < -f64::EPSILON {
                (lo - o) / d
            } else {
                f64::INFINITY
            }
        };
        let t = hit(origin.0, dir.0, x_faces).min(hit(origin.1, dir.1, y_faces));
        if t >= 0.0 { t.min(self.robot.analog_max_dist) } else { self.robot.analog_max_dist }
    }
}

fn combine(a: f64, u: (f64, f64), b: f64, v: (f64, f64)) -> (f64, f64) {
    (a * u.0 + b * v.0, a * u.1 + b * v.1)
}

/// The walls of the corridor cell the robot occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorridorMaze {
    pub facing: Direction,
    pub row: usize,
    pub col: usize,
    cells: usize,
}

impl CorridorMaze {
    pub fn new(sim: &SimConfig, facing: Direction, col: usize) -> Self {
        CorridorMaze {
            facing,
            row: sim.corridor_row,
            col: col.min(sim.corridor_cells.saturating_sub(1)),
            cells: sim.corridor_cells,
        }
    }

    /// Track the cell the pose estimate lies in.
    pub fn locate(&mut self, pose: GlobalPose) {
        self.col = pose.cell_col().min(self.cells.saturating_sub(1));
    }
}

impl MazeState for CorridorMaze {
    fn facing(&self) -> Direction {
        self.facing
    }

    fn row(&self) -> usize {
        self.row
    }

    fn col(&self) -> usize {
        self.col
    }

    fn is_wall_in_direction(&self, dir: Direction) -> bool {
        match dir {
            Direction::N | Direction::S => true,
            Direction::W => self.col == 0,
            Direction::E => self.col + 1 >= self.cells,
        }
    }
}
