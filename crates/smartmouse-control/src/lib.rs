#![warn(missing_docs)]
#![doc = "Pose estimation and kinematic control kernel of a maze-solving micromouse."]
#![doc = ""]
#![doc = "The [`KinematicController`] integrates wheel odometry, re-anchors it on the"]
#![doc = "maze walls seen by the distance sensors, and drives two wheel actuators. The"]
#![doc = "[`motion`] module builds straight drives and in-place turns on top of it."]

pub mod controller;
pub mod error;
pub mod fusion;
pub mod maze;
pub mod motion;

pub use controller::KinematicController;
pub use error::ControlError;
pub use fusion::{
    AnchorUpdate, DropDistance, FusionEstimate, SensorFusion, SideVerdict, WallSenseHistory, WallSide,
};
pub use maze::{CellWalls, MazeState};
pub use motion::{ActiveMotion, DriveStraight, MotionRequest, SteeringGains, TurnInPlace};
