//! Actuator capabilities.

pub mod actuator;
