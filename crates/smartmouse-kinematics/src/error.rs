//! Error types for the kinematics library.
//!
//! This module defines error types that can occur while validating robot
//! geometry, parsing headings and building velocity profiles.

use core::fmt;

/// Errors that can occur in kinematic calculations.
#[derive(Debug, Clone, PartialEq)]
pub enum KinematicsError {
    /// Error for invalid track width.
    /// This variant is returned when a track width is provided that is not positive.
    InvalidTrackWidth(&'static str),
    /// Error for invalid wheel radius.
    /// This variant is returned when a wheel radius is provided that is not positive.
    InvalidWheelRadius(&'static str),
    /// Error for an invalid robot configuration value other than the drive geometry.
    InvalidConfig(&'static str),
    /// Error for negative time delta.
    /// This variant is returned when a negative time delta is used for pose updates.
    NegativeTimeDelta(&'static str),
    /// Error for an unrecognized facing direction.
    /// Carries the character that failed to parse.
    InvalidDirection(char),
    /// Error for a velocity profile that cannot be built from its limits.
    InvalidProfile(&'static str),
}

impl fmt::Display for KinematicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KinematicsError::InvalidTrackWidth(msg) => write!(f, "Invalid track width: {}", msg),
            KinematicsError::InvalidWheelRadius(msg) => write!(f, "Invalid wheel radius: {}", msg),
            KinematicsError::InvalidConfig(msg) => write!(f, "Invalid robot configuration: {}", msg),
            KinematicsError::NegativeTimeDelta(msg) => write!(f, "Negative time delta: {}", msg),
            KinematicsError::InvalidDirection(c) => {
                write!(f, "Invalid direction '{}': expected one of N, E, S, W", c)
            }
            KinematicsError::InvalidProfile(msg) => write!(f, "Invalid velocity profile: {}", msg),
        }
    }
}

impl core::error::Error for KinematicsError {}
