#![warn(missing_docs)]
//! Closed-loop wheel actuators.
//!
//! The kinematic controller only sees the [`WheelActuator`] capability, so the
//! same control logic drives a simulated wheel or a physical motor driver.

pub mod devices;
pub mod traits;

pub use devices::regulated::RegulatedMotor;
pub use traits::actuator::{ActuatorState, PidGains, WheelActuator};
