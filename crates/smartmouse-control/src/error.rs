//! This module defines the error types used by the `smartmouse-control` crate.

use smartmouse_kinematics::KinematicsError;

/// Error type for controller construction and motion setup.
///
/// The per-cycle control path never fails; these errors come from building a
/// controller or starting a motion with inputs that cannot be used.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// The robot geometry or a profile limit was rejected.
    Kinematics(KinematicsError),
    /// A straight drive was asked to cover zero cell edges.
    InvalidEdgeCount(&'static str),
}

impl From<KinematicsError> for ControlError {
    fn from(err: KinematicsError) -> Self {
        ControlError::Kinematics(err)
    }
}

impl core::fmt::Display for ControlError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ControlError::Kinematics(err) => write!(f, "Kinematics error: {}", err),
            ControlError::InvalidEdgeCount(msg) => write!(f, "Invalid edge count: {}", msg),
        }
    }
}

impl core::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            ControlError::Kinematics(err) => Some(err),
            ControlError::InvalidEdgeCount(_) => None,
        }
    }
}
