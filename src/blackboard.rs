use parking_lot::RwLock;
use std::{sync::Arc, time::Instant};

use smartmouse_control::MotionRequest;
use smartmouse_kinematics::{Direction, GlobalPose};

/// State shared between the control thread and the async tasks.
#[derive(Debug, Clone)]
pub struct State {
    pub pose: GlobalPose,
    pub truth: GlobalPose,
    pub facing: Direction,
    pub active: Option<MotionRequest>,
    /// Motion requests the control thread is done with, finished or rejected.
    pub completed: usize,
    pub ticks: u64,
    pub last_tick_ts: Instant,
    pub faults: Vec<String>,
    pub shutdown: bool,
}

impl Default for State {
    fn default() -> Self {
        State {
            pose: GlobalPose::default(),
            truth: GlobalPose::default(),
            facing: Direction::E,
            active: None,
            completed: 0,
            ticks: 0,
            last_tick_ts: Instant::now(),
            faults: Vec::new(),
            shutdown: false,
        }
    }
}

pub type Blackboard = Arc<RwLock<State>>;

pub fn snapshot(bb: &Blackboard) -> State {
    (*bb.read()).clone()
}

pub fn raise_fault(bb: &Blackboard, msg: &str) {
    let mut g = bb.write();
    if !g.faults.iter().any(|s| s == msg) {
        g.faults.push(msg.to_string());
    }
}

pub fn request_shutdown(bb: &Blackboard) {
    bb.write().shutdown = true;
}

pub fn is_shutdown(bb: &Blackboard) -> bool {
    bb.read().shutdown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_are_deduplicated() {
        let bb: Blackboard = Arc::default();
        raise_fault(&bb, "control tick stalled");
        raise_fault(&bb, "control tick stalled");
        raise_fault(&bb, "motion timed out");
        assert_eq!(snapshot(&bb).faults.len(), 2);
    }

    #[test]
    fn test_shutdown_flag() {
        let bb: Blackboard = Arc::default();
        assert!(!is_shutdown(&bb));
        request_shutdown(&bb);
        assert!(is_shutdown(&bb));
    }
}
