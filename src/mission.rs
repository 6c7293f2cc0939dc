use std::sync::Arc;
use std::time::{Duration, Instant};

use smartmouse_control::MotionRequest;
use tokio::sync::broadcast;
use tokio::time;
use tracing::{debug, error, info};

use crate::blackboard::{Blackboard, is_shutdown, raise_fault, request_shutdown, snapshot};
use crate::bus::{Drained, Topic, drain_latest};
use crate::control::Telemetry;

/// Hand the requests to the control thread one at a time, then request shutdown.
pub async fn mission_task(
    bb: Blackboard,
    requests: Vec<MotionRequest>,
    request_tx: Topic<MotionRequest>,
    motion_timeout: Duration,
) -> anyhow::Result<()> {
    info!(count = requests.len(), "Mission task started.");
    let mut poll = time::interval(Duration::from_millis(5));

    for (i, request) in requests.into_iter().enumerate() {
        info!(step = i + 1, ?request, "Sending motion request");
        request_tx.publish(request);
        let sent = Instant::now();
        loop {
            poll.tick().await;
            let (completed, shutdown) = {
                let g = bb.read();
                (g.completed, g.shutdown)
            };
            if shutdown {
                info!("Shutdown requested, abandoning mission");
                return Ok(());
            }
            if completed > i {
                break;
            }
            if sent.elapsed() > motion_timeout {
                error!(?request, timeout = ?motion_timeout, "Motion request timed out");
                raise_fault(&bb, "motion timed out");
                request_shutdown(&bb);
                anyhow::bail!("motion request {request:?} did not finish within {motion_timeout:?}");
            }
        }
        let s = snapshot(&bb);
        info!(step = i + 1, pose = %s.pose, facing = %s.facing, "Motion request finished");
    }

    info!("Mission complete.");
    request_shutdown(&bb);
    Ok(())
}

/// Log the newest telemetry at a low rate until the control thread goes away.
pub async fn telemetry_task(
    bb: Blackboard,
    mut rx: broadcast::Receiver<Arc<Telemetry>>,
    period: Duration,
) -> anyhow::Result<()> {
    info!(?period, "Telemetry task started.");
    let mut tick = time::interval(period);
    loop {
        tick.tick().await;
        match drain_latest(&mut rx) {
            Drained::Latest(t) => info!(
                tick = t.tick,
                pose = %t.pose,
                truth = %t.truth,
                facing = %t.facing,
                side = ?t.fusion_side,
                active = ?t.active,
                "Telemetry"
            ),
            Drained::Empty => debug!("No telemetry since last report"),
            Drained::Closed => break,
        }
        if is_shutdown(&bb) {
            break;
        }
    }
    info!("Telemetry task finished.");
    Ok(())
}
