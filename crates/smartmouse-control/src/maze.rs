//! The maze knowledge the kernel consumes.

use smartmouse_kinematics::Direction;

/// Robot and maze state owned by the maze/robot collaborator.
///
/// Wall presence here is logical knowledge of the maze, independent of what
/// the distance sensors currently see.
pub trait MazeState {
    /// Direction the robot is facing.
    fn facing(&self) -> Direction;

    /// Row of the occupied cell.
    fn row(&self) -> usize;

    /// Column of the occupied cell.
    fn col(&self) -> usize;

    /// Whether a wall bounds the occupied cell in `dir`.
    fn is_wall_in_direction(&self, dir: Direction) -> bool;
}

/// The walls around one cell together with the robot's heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellWalls {
    /// Direction the robot is facing.
    pub facing: Direction,
    /// Row of the cell.
    pub row: usize,
    /// Column of the cell.
    pub col: usize,
    /// Walls indexed in `Direction::ALL` order (N, E, S, W).
    pub walls: [bool; 4],
}

impl CellWalls {
    /// Cell `(row, col)` seen while facing `facing`, with no walls.
    pub fn open(facing: Direction, row: usize, col: usize) -> Self {
        CellWalls { facing, row, col, walls: [false; 4] }
    }

    /// Builder-style wall setter.
    pub fn with_wall(mut self, dir: Direction, present: bool) -> Self {
        self.walls[Self::index(dir)] = present;
        self
    }

    fn index(dir: Direction) -> usize {
        match dir {
            Direction::N => 0,
            Direction::E => 1,
            Direction::S => 2,
            Direction::W => 3,
        }
    }
}

impl MazeState for CellWalls {
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
        self.walls[Self::index(dir)]
    }
}
