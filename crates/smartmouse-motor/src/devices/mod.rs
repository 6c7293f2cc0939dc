//! Actuator implementations.

pub mod regulated;
