use std::fmt;

use pid::Pid;
use smartmouse_kinematics::RobotConfig;
use tracing::debug;

use crate::traits::actuator::{ActuatorState, PidGains, WheelActuator};

/// Wheel speed (rad/s) below which a wheel counts as stopped.
pub const STOPPED_VELOCITY_RPS: f64 = 0.05;

/// A speed-regulated wheel.
///
/// Velocity is estimated from successive measured wheel angles. The tracked
/// setpoint ramps toward the commanded speed at the configured acceleration,
/// and the force command is the PID output on the speed error plus a
/// feed-forward term, clamped to the configured maximum force.
#[derive(Clone)]
pub struct RegulatedMotor {
    pid: Pid<f64>,
    gains: PidGains,
    /// Wheel rotation per cell unit rolled.
    rad_per_cu: f64,
    max_force: f64,
    acceleration_rpss: f64,
    commanded_rps: f64,
    tracked_rps: f64,
    last_angle_rad: Option<f64>,
    velocity_rps: f64,
    force: f64,
}

impl fmt::Debug for RegulatedMotor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegulatedMotor")
            .field("gains", &self.gains)
            .field("commanded_rps", &self.commanded_rps)
            .field("tracked_rps", &self.tracked_rps)
            .field("velocity_rps", &self.velocity_rps)
            .field("force", &self.force)
            .finish_non_exhaustive()
    }
}

impl RegulatedMotor {
    /// Build a motor for the given robot geometry and gains.
    ///
    /// The acceleration limit starts unbounded, so the setpoint follows commands
    /// immediately until [`WheelActuator::set_acceleration_cpss`] is called.
    pub fn new(config: &RobotConfig, gains: PidGains) -> Self {
        let max_force = config.max_force;
        let mut motor = RegulatedMotor {
            pid: Pid::new(0.0, max_force),
            gains,
            rad_per_cu: config.cu_to_rad(1.0),
            max_force,
            acceleration_rpss: f64::INFINITY,
            commanded_rps: 0.0,
            tracked_rps: 0.0,
            last_angle_rad: None,
            velocity_rps: 0.0,
            force: 0.0,
        };
        motor.apply_gains();
        motor
    }

    fn apply_gains(&mut self) {
        let limit = self.max_force;
        self.pid
            .p(self.gains.kp, limit)
            .i(self.gains.ki, limit)
            .d(self.gains.kd, limit);
    }

    fn feed_forward(&self, setpoint_rps: f64) -> f64 {
        if setpoint_rps.abs() < STOPPED_VELOCITY_RPS {
            return 0.0;
        }
        setpoint_rps.signum() * (self.gains.ff_offset + self.gains.ff_scale * setpoint_rps.abs())
    }

    /// Gains currently in use.
    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Last force command.
    pub fn force(&self) -> f64 {
        self.force
    }

    /// Speed the loop is currently tracking (rad/s).
    pub fn tracked_setpoint_rps(&self) -> f64 {
        self.tracked_rps
    }
}

impl WheelActuator for RegulatedMotor {
    fn velocity_rps(&self) -> f64 {
        self.velocity_rps
    }

    fn run_pid(&mut self, dt_s: f64, angle_rad: f64) -> f64 {
        if !(dt_s > 0.0) || !angle_rad.is_finite() {
            return self.force;
        }
        if let Some(last) = self.last_angle_rad {
            self.velocity_rps = (angle_rad - last) / dt_s;
        }
        self.last_angle_rad = Some(angle_rad);

        let max_step = self.acceleration_rpss * dt_s;
        self.tracked_rps += (self.commanded_rps - self.tracked_rps).clamp(-max_step, max_step);

        if self.tracked_rps == 0.0 && self.velocity_rps.abs() < STOPPED_VELOCITY_RPS {
            // holding still: keep the integrator from winding up against friction
            self.pid.reset_integral_term();
            self.force = 0.0;
            return self.force;
        }

        self.pid.setpoint(self.tracked_rps);
        let feedback = self.pid.next_control_output(self.velocity_rps).output;
        self.force = (feedback + self.feed_forward(self.tracked_rps)).clamp(-self.max_force, self.max_force);
        self.force
    }

    fn set_acceleration_cpss(&mut self, acceleration_cpss: f64) {
        self.acceleration_rpss = if acceleration_cpss > 0.0 {
            acceleration_cpss * self.rad_per_cu
        } else {
            f64::INFINITY
        };
    }

    fn set_setpoint_cps(&mut self, setpoint_cps: f64) {
        self.commanded_rps = if setpoint_cps.is_finite() { setpoint_cps * self.rad_per_cu } else { 0.0 };
    }

    fn set_params(&mut self, gains: PidGains) {
        debug!(?gains, "Updating wheel speed loop gains");
        self.gains = gains;
        self.apply_gains();
    }

    fn is_stopped(&self) -> bool {
        self.velocity_rps.abs() < STOPPED_VELOCITY_RPS
    }

    fn state(&self) -> ActuatorState {
        ActuatorState {
            velocity_rps: self.velocity_rps,
            setpoint_rps: self.tracked_rps,
            force: self.force,
            stopped: self.is_stopped(),
        }
    }
}
