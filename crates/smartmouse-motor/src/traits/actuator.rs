#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Gains of a wheel's speed loop.
///
/// The feed-forward term is `sign(sp) * (ff_offset + ff_scale * |sp|)` for a
/// setpoint `sp` in rad/s, added to the PID output.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain, applied per control cycle.
    pub ki: f64,
    /// Derivative gain, applied per control cycle.
    pub kd: f64,
    /// Feed-forward force per rad/s of setpoint.
    pub ff_scale: f64,
    /// Feed-forward force needed to overcome static friction.
    pub ff_offset: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        PidGains {
            kp: 0.0005,
            ki: 0.00002,
            kd: 0.0,
            ff_scale: 0.00066,
            ff_offset: 0.0,
        }
    }
}

/// Snapshot of an actuator, for logging and telemetry.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorState {
    /// Measured wheel speed (rad/s).
    pub velocity_rps: f64,
    /// Speed the loop is currently tracking, after acceleration limiting (rad/s).
    pub setpoint_rps: f64,
    /// Last force command.
    pub force: f64,
    /// Whether the wheel is stopped.
    pub stopped: bool,
}

/// Core trait defining one wheel's closed-loop speed control.
///
/// Implementations are driven once per control cycle through [`WheelActuator::run_pid`]
/// and must not block.
pub trait WheelActuator {
    /// Current measured wheel speed (rad/s).
    fn velocity_rps(&self) -> f64;

    /// Feed the wheel angle measured this cycle and return the force command to apply.
    fn run_pid(&mut self, dt_s: f64, angle_rad: f64) -> f64;

    /// Limit how fast the tracked setpoint may change (cells/s^2).
    fn set_acceleration_cpss(&mut self, acceleration_cpss: f64);

    /// Command a wheel surface speed (cells/s).
    fn set_setpoint_cps(&mut self, setpoint_cps: f64);

    /// Replace the speed loop gains.
    fn set_params(&mut self, gains: PidGains);

    /// Whether the wheel has stopped turning.
    fn is_stopped(&self) -> bool;

    /// Snapshot of the actuator.
    fn state(&self) -> ActuatorState;
}
