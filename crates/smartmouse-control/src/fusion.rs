//! Wall-relative pose correction from the side distance sensors.
//!
//! Each side carries a front and a back sensor. The two points they hit lie on
//! the side wall, which gives the yaw of the robot relative to that wall and
//! the perpendicular distance to it. A side is only trusted when it passes
//! every gate, evaluated in order:
//!
//! 1. both readings are below the side wall threshold,
//! 2. the drop-off ("gerald") sensor does not see the wall ending ahead,
//! 3. neither reading jumped since the previous cycle,
//! 4. the maze knowledge agrees there is a wall on that side.
//!
//! The right wall wins when both sides pass. With no trusted side the pose is
//! left to odometry.

use smartmouse_kinematics::{Direction, GlobalPose, RangeData, RobotConfig, wrap_angle, yaw_diff};
use tracing::trace;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The four side readings of the previous cycle.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WallSenseHistory {
    /// Previous front-left reading (m).
    pub last_front_left: f64,
    /// Previous front-right reading (m).
    pub last_front_right: f64,
    /// Previous back-left reading (m).
    pub last_back_left: f64,
    /// Previous back-right reading (m).
    pub last_back_right: f64,
}

impl WallSenseHistory {
    /// History in which every side sensor last saw nothing.
    pub const fn clear(max_range: f64) -> Self {
        WallSenseHistory {
            last_front_left: max_range,
            last_front_right: max_range,
            last_back_left: max_range,
            last_back_right: max_range,
        }
    }

    /// History holding the side readings of `range`.
    pub const fn from_range(range: &RangeData) -> Self {
        WallSenseHistory {
            last_front_left: range.front_left,
            last_front_right: range.front_right,
            last_back_left: range.back_left,
            last_back_right: range.back_right,
        }
    }
}

/// Distance left until each side wall ends, refreshed whenever a drop-off sensor fires.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DropDistance {
    /// Until the left wall ends (m).
    pub d_until_left_drop: f64,
    /// Until the right wall ends (m).
    pub d_until_right_drop: f64,
}

/// A side of the robot.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WallSide {
    /// Left side.
    Left,
    /// Right side.
    Right,
}

/// Outcome of the gates for one side; the first failing gate is reported.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideVerdict {
    /// Passed every gate.
    Trusted,
    /// A reading was at or above the side wall threshold.
    BeyondThreshold,
    /// The drop-off sensor saw the wall ending ahead.
    DropOff,
    /// A reading changed too much since the previous cycle.
    Changed,
    /// The maze knowledge has no wall on this side.
    NotInMaze,
}

/// Result of one fusion pass.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionEstimate {
    /// Estimated maze-frame yaw (rad); meaningless when ignored.
    pub yaw: f64,
    /// Distance from the left wall's center line to the robot center (m); meaningless when ignored.
    pub offset_m: f64,
    /// The side the estimate came from, `None` to keep odometry.
    pub side: Option<WallSide>,
    /// Gate outcome for the left side.
    pub left: SideVerdict,
    /// Gate outcome for the right side.
    pub right: SideVerdict,
}

impl FusionEstimate {
    /// Whether odometry should be kept untouched this cycle.
    pub fn should_ignore(&self) -> bool {
        self.side.is_none()
    }
}

/// Which pose components a correction overwrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AnchorUpdate {
    /// Yaw and the lateral coordinate were re-anchored.
    pub lateral: bool,
    /// The along-axis coordinate was re-anchored from the front wall.
    pub forward: bool,
}

/// Wall line seen by one side, in that side's frame (x forward, y toward the side).
#[derive(Debug, Clone, Copy, PartialEq)]
struct SideGeometry {
    yaw: f64,
    dist: f64,
}

/// The fusion corrector and the state it carries from cycle to cycle.
#[derive(Debug, Clone)]
pub struct SensorFusion {
    config: RobotConfig,
    history: WallSenseHistory,
    drops: DropDistance,
}

impl SensorFusion {
    /// Build a corrector whose history says no side sensor saw anything.
    pub fn new(config: RobotConfig) -> Self {
        SensorFusion {
            history: WallSenseHistory::clear(config.analog_max_dist),
            drops: DropDistance::default(),
            config,
        }
    }

    /// Side readings of the previous cycle.
    pub fn history(&self) -> WallSenseHistory {
        self.history
    }

    /// Replace the previous-cycle readings.
    pub fn set_history(&mut self, history: WallSenseHistory) {
        self.history = history;
    }

    /// Latest drop-off distances.
    pub fn drop_distance(&self) -> DropDistance {
        self.drops
    }

    fn side_geometry(&self, front: f64, back: f64) -> Option<SideGeometry> {
        let c = &self.config;
        let d1x = c.back_analog_angle.cos() * back + c.back_side_analog_x;
        let d1y = c.back_analog_angle.sin() * back + c.back_side_analog_y;
        let d2x = c.front_analog_angle.cos() * front + c.front_side_analog_x;
        let d2y = c.front_analog_angle.sin() * front + c.front_side_analog_y;
        let len = (d2y - d1y).hypot(d2x - d1x);
        if !(len > f64::EPSILON) {
            return None;
        }
        Some(SideGeometry {
            yaw: (d2y - d1y).atan2(d2x - d1x),
            dist: (d2x * d1y - d2y * d1x) / len,
        })
    }

    /// Gates 1 to 3 for one side; refreshes `drop` when the drop-off sensor fires.
    fn sense_gates(
        &self,
        (front, back, gerald): (f64, f64, f64),
        (last_front, last_back): (f64, f64),
        geometry: Option<SideGeometry>,
        drop: &mut f64,
    ) -> SideVerdict {
        let c = &self.config;
        let mut verdict = if front < c.side_wall_threshold && back < c.side_wall_threshold && geometry.is_some() {
            SideVerdict::Trusted
        } else {
            SideVerdict::BeyondThreshold
        };

        if gerald > c.gerald_wall_threshold {
            if let Some(g) = geometry {
                *drop = c.drop_safety * c.gerald_angle.tan() * g.dist;
            }
            if verdict == SideVerdict::Trusted {
                verdict = SideVerdict::DropOff;
            }
        }

        let changed = (front - last_front).abs() > c.wall_changed_threshold
            || (back - last_back).abs() > c.wall_changed_threshold;
        if changed && verdict == SideVerdict::Trusted {
            verdict = SideVerdict::Changed;
        }
        verdict
    }

    /// Run the gates on `range` and pick the side to trust, if any.
    ///
    /// `wall_in` answers whether the maze knowledge has a wall in a direction.
    /// The side readings of `range` become the history for the next cycle.
    pub fn estimate(
        &mut self,
        range: &RangeData,
        facing: Direction,
        wall_in: impl Fn(Direction) -> bool,
    ) -> FusionEstimate {
        let left_geometry = self.side_geometry(range.front_left, range.back_left);
        let right_geometry = self.side_geometry(range.front_right, range.back_right);

        let mut drops = self.drops;
        let mut left = self.sense_gates(
            (range.front_left, range.back_left, range.gerald_left),
            (self.history.last_front_left, self.history.last_back_left),
            left_geometry,
            &mut drops.d_until_left_drop,
        );
        let mut right = self.sense_gates(
            (range.front_right, range.back_right, range.gerald_right),
            (self.history.last_front_right, self.history.last_back_right),
            right_geometry,
            &mut drops.d_until_right_drop,
        );
        self.drops = drops;

        if left == SideVerdict::Trusted && !wall_in(facing.left()) {
            left = SideVerdict::NotInMaze;
        }
        if right == SideVerdict::Trusted && !wall_in(facing.right()) {
            right = SideVerdict::NotInMaze;
        }

        let half_wall = self.config.half_wall_thickness();
        let (side, yaw, offset_m) = match (left_geometry, right_geometry) {
            (_, Some(g)) if right == SideVerdict::Trusted => (
                Some(WallSide::Right),
                // the right side frame is mirrored
                wrap_angle(facing.yaw() - g.yaw),
                self.config.unit_dist - g.dist - half_wall,
            ),
            (Some(g), _) if left == SideVerdict::Trusted => {
                (Some(WallSide::Left), wrap_angle(facing.yaw() + g.yaw), g.dist + half_wall)
            }
            _ => (None, 0.0, 0.0),
        };

        self.history = WallSenseHistory::from_range(range);
        trace!(?left, ?right, ?side, yaw, offset_m, "Fusion gates evaluated");

        FusionEstimate { yaw, offset_m, side, left, right }
    }

    /// Overwrite the pose components a trusted estimate determines.
    ///
    /// Yaw and the lateral coordinate come from the side wall. The along-axis
    /// coordinate is only re-anchored when the forward sensor also sees a wall,
    /// and never from the side wall alone.
    pub fn anchor(
        &self,
        pose: &mut GlobalPose,
        estimate: &FusionEstimate,
        range: &RangeData,
        facing: Direction,
    ) -> AnchorUpdate {
        if estimate.should_ignore() {
            return AnchorUpdate::default();
        }
        let c = &self.config;
        let lateral_axis = facing.lateral_axis();
        let forward_axis = facing.forward_axis();
        let lateral_cell = pose.axis(lateral_axis).floor();
        let forward_cell = pose.axis(forward_axis).floor();

        pose.yaw = estimate.yaw;
        let offset_cu = c.to_cell_units(estimate.offset_m);
        let lateral = if facing.left_sign() < 0.0 {
            lateral_cell + offset_cu
        } else {
            lateral_cell + 1.0 - offset_cu
        };
        pose.set_axis(lateral_axis, lateral);

        let mut update = AnchorUpdate { lateral: true, forward: false };
        if range.front < c.front_wall_threshold {
            let yaw_error = yaw_diff(pose.yaw, facing.yaw());
            let d_wall_front_cu = c.to_cell_units(yaw_error.cos() * range.front + c.front_analog_x);
            let half_wall_cu = c.half_wall_thickness_cu();
            let forward = if facing.forward_sign() < 0.0 {
                forward_cell + d_wall_front_cu + half_wall_cu
            } else {
                forward_cell + 1.0 - d_wall_front_cu - half_wall_cu
            };
            pose.set_axis(forward_axis, forward);
            update.forward = true;
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EPSILON: f64 = 1e-9;

    /// Range a sensor at `(sx, sy)` aiming at `angle` reads against a wall whose
    /// face is `dist` away and tilted by `wall_yaw`, all in one side's frame.
    fn ray_to_wall(sx: f64, sy: f64, angle: f64, dist: f64, wall_yaw: f64) -> f64 {
        let (nx, ny) = (-wall_yaw.sin(), wall_yaw.cos());
        (dist - (nx * sx + ny * sy)) / (nx * angle.cos() + ny * angle.sin())
    }

    /// Front and back readings of one side for a wall face `dist` away, tilted by `wall_yaw`.
    fn side_readings(config: &RobotConfig, dist: f64, wall_yaw: f64) -> (f64, f64) {
        let front = ray_to_wall(
            config.front_side_analog_x,
            config.front_side_analog_y,
            config.front_analog_angle,
            dist,
            wall_yaw,
        );
        let back = ray_to_wall(
            config.back_side_analog_x,
            config.back_side_analog_y,
            config.back_analog_angle,
            dist,
            wall_yaw,
        );
        (front, back)
    }

    /// Snapshot of a robot with walls on both sides and nothing ahead.
    /// `psi` is the heading error toward the right.
    fn corridor(config: &RobotConfig, d_left: f64, d_right: f64, psi: f64) -> RangeData {
        let (front_left, back_left) = side_readings(config, d_left, psi);
        let (front_right, back_right) = side_readings(config, d_right, -psi);
        RangeData {
            front: config.analog_max_dist,
            front_left,
            front_right,
            back_left,
            back_right,
            gerald_left: 0.1,
            gerald_right: 0.1,
        }
    }

    fn primed(config: RobotConfig, range: &RangeData) -> SensorFusion {
        let mut fusion = SensorFusion::new(config);
        fusion.set_history(WallSenseHistory::from_range(range));
        fusion
    }

    #[test]
    fn test_side_geometry_recovers_wall() {
        let config = RobotConfig::SIM;
        let fusion = SensorFusion::new(config);
        let (front, back) = side_readings(&config, 0.05, 0.04);
        let g = fusion.side_geometry(front, back).unwrap();
        assert!((g.yaw - 0.04).abs() < EPSILON);
        assert!((g.dist - 0.05).abs() < EPSILON);
    }

    #[test]
    fn test_right_wall_wins_when_both_pass() {
        let config = RobotConfig::SIM;
        let range = corridor(&config, 0.05, 0.058, 0.03);
        let mut fusion = primed(config, &range);
        let estimate = fusion.estimate(&range, Direction::N, |_| true);

        assert_eq!(estimate.side, Some(WallSide::Right));
        assert_eq!(estimate.left, SideVerdict::Trusted);
        assert!((estimate.yaw - (Direction::N.yaw() + 0.03)).abs() < EPSILON);
        let expected = config.unit_dist - 0.058 - config.half_wall_thickness();
        assert!((estimate.offset_m - expected).abs() < EPSILON);
    }

    #[test]
    fn test_left_wall_used_when_right_not_in_maze() {
        let config = RobotConfig::SIM;
        let range = corridor(&config, 0.05, 0.058, -0.02);
        let mut fusion = primed(config, &range);
        let estimate = fusion.estimate(&range, Direction::E, |dir| dir != Direction::S);

        assert_eq!(estimate.right, SideVerdict::NotInMaze);
        assert_eq!(estimate.side, Some(WallSide::Left));
        assert!((estimate.yaw - (-0.02)).abs() < EPSILON);
        assert!((estimate.offset_m - (0.05 + config.half_wall_thickness())).abs() < EPSILON);
    }

    #[test]
    fn test_far_walls_are_ignored() {
        let config = RobotConfig::SIM;
        let range = RangeData::clear(config.analog_max_dist);
        let mut fusion = SensorFusion::new(config);
        let estimate = fusion.estimate(&range, Direction::S, |_| true);
        assert!(estimate.should_ignore());
        assert_eq!(estimate.left, SideVerdict::BeyondThreshold);
        assert_eq!(estimate.right, SideVerdict::BeyondThreshold);
    }

    #[test]
    fn test_drop_off_gate_skips_left() {
        let config = RobotConfig::SIM;
        let mut range = corridor(&config, 0.05, 0.05, 0.0);
        range.gerald_left = config.gerald_wall_threshold + 0.01;
        assert!(range.front_left < config.side_wall_threshold);
        assert!(range.back_left < config.side_wall_threshold);

        let mut fusion = primed(config, &range);
        // only the left wall is known, so nothing else can be trusted
        let estimate = fusion.estimate(&range, Direction::N, |dir| dir == Direction::W);

        assert_eq!(estimate.left, SideVerdict::DropOff);
        assert!(estimate.should_ignore());
        let expected = config.drop_safety * config.gerald_angle.tan() * 0.05;
        assert!((fusion.drop_distance().d_until_left_drop - expected).abs() < EPSILON);
        assert_eq!(fusion.drop_distance().d_until_right_drop, 0.0);
    }

    #[test]
    fn test_abrupt_change_gate() {
        let config = RobotConfig::SIM;
        let range = corridor(&config, 0.05, 0.05, 0.0);
        let mut fusion = SensorFusion::new(config);
        // wall appearing: previous cycle saw nothing
        let first = fusion.estimate(&range, Direction::N, |_| true);
        assert_eq!(first.left, SideVerdict::Changed);
        assert_eq!(first.right, SideVerdict::Changed);
        assert!(first.should_ignore());
        assert_eq!(fusion.history(), WallSenseHistory::from_range(&range));

        // same wall next cycle is trusted
        let second = fusion.estimate(&range, Direction::N, |_| true);
        assert_eq!(second.side, Some(WallSide::Right));
    }

    #[test]
    fn test_fusion_gating_is_deterministic() {
        let config = RobotConfig::SIM;
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let snapshots: Vec<(RangeData, [bool; 4])> = (0..500)
            .map(|_| {
                let base = corridor(&config, rng.random_range(0.02..0.09), rng.random_range(0.02..0.09), rng.random_range(-0.1..0.1));
                let noisy = RangeData {
                    front: rng.random_range(0.0..0.2),
                    front_left: base.front_left + rng.random_range(-0.03..0.03),
                    back_right: base.back_right + rng.random_range(-0.03..0.03),
                    gerald_left: rng.random_range(0.05..0.2),
                    gerald_right: rng.random_range(0.05..0.2),
                    ..base
                };
                let walls = [rng.random_bool(0.5), rng.random_bool(0.5), rng.random_bool(0.5), rng.random_bool(0.5)];
                (noisy, walls)
            })
            .collect();

        let replay = || {
            let mut fusion = SensorFusion::new(config);
            let mut pose = GlobalPose::new(1.5, 1.5, Direction::E.yaw());
            let mut out = Vec::new();
            for (range, walls) in &snapshots {
                let estimate = fusion.estimate(range, Direction::E, |dir| walls[dir as usize]);
                fusion.anchor(&mut pose, &estimate, range, Direction::E);
                out.push((estimate, pose, fusion.drop_distance()));
            }
            out
        };

        let first = replay();
        let second = replay();
        assert_eq!(first, second);
        assert!(first.iter().any(|(e, _, _)| e.side.is_some()));
        assert!(first.iter().any(|(e, _, _)| e.side.is_none()));
    }

    #[test]
    fn test_anchor_lateral_per_direction() {
        let config = RobotConfig::SIM;
        let fusion = SensorFusion::new(config);
        let range = RangeData::clear(config.analog_max_dist);
        let estimate = FusionEstimate {
            yaw: 0.0,
            offset_m: 0.045,
            side: Some(WallSide::Left),
            left: SideVerdict::Trusted,
            right: SideVerdict::Trusted,
        };
        let offset_cu = 0.045 / config.unit_dist;

        for (facing, start, axis_value) in [
            (Direction::N, GlobalPose::new(2.7, 3.5, 0.0), 2.0 + offset_cu),
            (Direction::S, GlobalPose::new(2.7, 3.5, 0.0), 3.0 - offset_cu),
            (Direction::E, GlobalPose::new(2.7, 3.5, 0.0), 3.0 + offset_cu),
            (Direction::W, GlobalPose::new(2.7, 3.5, 0.0), 4.0 - offset_cu),
        ] {
            let mut pose = start;
            let estimate = FusionEstimate { yaw: facing.yaw(), ..estimate };
            let update = fusion.anchor(&mut pose, &estimate, &range, facing);
            assert_eq!(update, AnchorUpdate { lateral: true, forward: false });
            assert!((pose.axis(facing.lateral_axis()) - axis_value).abs() < EPSILON, "{}", facing);
            // along-axis coordinate untouched without a front wall
            assert_eq!(pose.axis(facing.forward_axis()), start.axis(facing.forward_axis()));
            assert_eq!(pose.yaw, facing.yaw());
        }
    }

    #[test]
    fn test_anchor_front_wall() {
        let config = RobotConfig::SIM;
        let fusion = SensorFusion::new(config);
        let mut range = RangeData::clear(config.analog_max_dist);
        range.front = 0.03;
        let yaw_error = 0.1;
        let estimate = FusionEstimate {
            yaw: Direction::N.yaw() + yaw_error,
            offset_m: 0.09,
            side: Some(WallSide::Right),
            left: SideVerdict::NotInMaze,
            right: SideVerdict::Trusted,
        };
        let mut pose = GlobalPose::new(2.5, 3.6, Direction::N.yaw());
        let update = fusion.anchor(&mut pose, &estimate, &range, Direction::N);
        assert!(update.forward);

        let d_front = config.to_cell_units(yaw_error.cos() * 0.03 + config.front_analog_x);
        assert!((pose.row - (3.0 + d_front + config.half_wall_thickness_cu())).abs() < EPSILON);
        assert!((pose.col - 2.5).abs() < EPSILON);

        let mut pose = GlobalPose::new(2.5, 3.6, Direction::S.yaw());
        let estimate = FusionEstimate { yaw: Direction::S.yaw(), ..estimate };
        fusion.anchor(&mut pose, &estimate, &range, Direction::S);
        let d_front = config.to_cell_units(0.03 + config.front_analog_x);
        assert!((pose.row - (4.0 - d_front - config.half_wall_thickness_cu())).abs() < EPSILON);

        let mut pose = GlobalPose::new(2.6, 3.5, Direction::E.yaw());
        let estimate = FusionEstimate { yaw: Direction::E.yaw(), ..estimate };
        assert!(fusion.anchor(&mut pose, &estimate, &range, Direction::E).forward);
        assert!((pose.col - (3.0 - d_front - config.half_wall_thickness_cu())).abs() < EPSILON);

        let mut pose = GlobalPose::new(2.6, 3.5, Direction::W.yaw());
        let estimate = FusionEstimate { yaw: Direction::W.yaw(), ..estimate };
        assert!(fusion.anchor(&mut pose, &estimate, &range, Direction::W).forward);
        assert!((pose.col - (2.0 + d_front + config.half_wall_thickness_cu())).abs() < EPSILON);
    }

    #[test]
    fn test_ignored_estimate_leaves_pose() {
        let config = RobotConfig::SIM;
        let fusion = SensorFusion::new(config);
        let range = RangeData::clear(config.analog_max_dist);
        let estimate = FusionEstimate {
            yaw: 1.0,
            offset_m: 0.05,
            side: None,
            left: SideVerdict::BeyondThreshold,
            right: SideVerdict::BeyondThreshold,
        };
        let mut pose = GlobalPose::new(0.3, 0.4, 0.5);
        assert_eq!(fusion.anchor(&mut pose, &estimate, &range, Direction::E), AnchorUpdate::default());
        assert_eq!(pose, GlobalPose::new(0.3, 0.4, 0.5));
    }
}
