//! Cardinal facing directions and the per-direction axis tables.
//!
//! The maze frame has `col` growing eastward and `row` growing southward, with
//! yaw measured from `+col` toward `+row`. Every place that needs to know which
//! pose axis is "forward" or "left" for a heading goes through the table here.

use core::f64::consts::{FRAC_PI_2, PI};
use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::KinematicsError;
use crate::math::yaw_diff;

/// One of the two pose axes of the maze frame.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Column axis, grows eastward.
    Col,
    /// Row axis, grows southward.
    Row,
}

/// The direction the robot is facing, one of the four maze headings.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// North, toward decreasing row.
    N,
    /// East, toward increasing col.
    E,
    /// South, toward increasing row.
    S,
    /// West, toward decreasing col.
    W,
}

impl Direction {
    /// All four directions in clockwise order starting at north.
    pub const ALL: [Direction; 4] = [Direction::N, Direction::E, Direction::S, Direction::W];

    /// Yaw of this heading in the maze frame.
    pub const fn yaw(self) -> f64 {
        match self {
            Direction::N => -FRAC_PI_2,
            Direction::E => 0.0,
            Direction::S => FRAC_PI_2,
            Direction::W => PI,
        }
    }

    /// The heading a quarter turn counter-clockwise (to the robot's left).
    pub const fn left(self) -> Direction {
        match self {
            Direction::N => Direction::W,
            Direction::W => Direction::S,
            Direction::S => Direction::E,
            Direction::E => Direction::N,
        }
    }

    /// The heading a quarter turn clockwise (to the robot's right).
    pub const fn right(self) -> Direction {
        match self {
            Direction::N => Direction::E,
            Direction::E => Direction::S,
            Direction::S => Direction::W,
            Direction::W => Direction::N,
        }
    }

    /// The heading behind.
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::N => Direction::S,
            Direction::E => Direction::W,
            Direction::S => Direction::N,
            Direction::W => Direction::E,
        }
    }

    /// The pose axis that changes when driving forward.
    pub const fn forward_axis(self) -> Axis {
        match self {
            Direction::N | Direction::S => Axis::Row,
            Direction::E | Direction::W => Axis::Col,
        }
    }

    /// The pose axis that changes when drifting sideways.
    pub const fn lateral_axis(self) -> Axis {
        match self {
            Direction::N | Direction::S => Axis::Col,
            Direction::E | Direction::W => Axis::Row,
        }
    }

    /// `+1.0` if the forward axis coordinate grows when driving forward, `-1.0` otherwise.
    pub const fn forward_sign(self) -> f64 {
        match self {
            Direction::S | Direction::E => 1.0,
            Direction::N | Direction::W => -1.0,
        }
    }

    /// `+1.0` if the lateral axis coordinate grows toward the robot's left, `-1.0` otherwise.
    pub const fn left_sign(self) -> f64 {
        self.left().forward_sign()
    }

    /// The cardinal heading nearest to `yaw`.
    pub fn from_yaw(yaw: f64) -> Direction {
        let mut best = Direction::N;
        let mut best_err = f64::MAX;
        for dir in Direction::ALL {
            let err = libm::fabs(yaw_diff(dir.yaw(), yaw));
            if err < best_err {
                best = dir;
                best_err = err;
            }
        }
        best
    }

    /// Single-letter name of this heading.
    pub const fn as_char(self) -> char {
        match self {
            Direction::N => 'N',
            Direction::E => 'E',
            Direction::S => 'S',
            Direction::W => 'W',
        }
    }
}

impl TryFrom<char> for Direction {
    type Error = KinematicsError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c.to_ascii_uppercase() {
            'N' => Ok(Direction::N),
            'E' => Ok(Direction::E),
            'S' => Ok(Direction::S),
            'W' => Ok(Direction::W),
            _ => Err(KinematicsError::InvalidDirection(c)),
        }
    }
}

impl FromStr for Direction {
    type Err = KinematicsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Direction::try_from(c),
            (Some(c), Some(_)) => Err(KinematicsError::InvalidDirection(c)),
            (None, _) => Err(KinematicsError::InvalidDirection(' ')),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
