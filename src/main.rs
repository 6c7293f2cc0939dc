mod blackboard; // shared state between the control thread and the async tasks
mod bus; // broadcast topics
mod config; // layered configuration
mod control; // the fixed-rate control thread
mod mission; // mission sequencing and telemetry
mod sim; // corridor plant

use blackboard::{Blackboard, is_shutdown, raise_fault, request_shutdown, snapshot};
use bus::Topic;
use control::{ControlLoop, Telemetry};

use smartmouse_control::MotionRequest;
use std::{sync::Arc, time::{Duration, Instant}};
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    info!("Smartmouse host loop starting.");
    let app = config::load_config()?;
    let facing = app.mission.facing()?;
    let control = ControlLoop::new(&app, facing)?;

    let bb: Blackboard = Arc::default();
    bb.write().facing = facing;
    let request_topic: Topic<MotionRequest> = Topic::new(16);
    let telemetry_topic: Topic<Telemetry> = Topic::new(64);
    let request_rx = request_topic.subscribe();
    let telemetry_rx = telemetry_topic.subscribe();

    info!("Spawning control thread...");
    let period = Duration::from_micros(app.timing.period_us);
    let control_thread = std::thread::Builder::new()
        .name("control".into())
        .spawn({
            let bb = Arc::clone(&bb);
            move || {
                let result = control.run(&bb, request_rx, &telemetry_topic, period);
                if let Err(err) = &result {
                    error!(%err, "Control thread failed.");
                    request_shutdown(&bb);
                }
                result
            }
        })?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async_runtime(bb.clone(), app, request_topic, telemetry_rx));
    request_shutdown(&bb);
    let control_result = control_thread
        .join()
        .map_err(|_| anyhow::anyhow!("control thread panicked"))?;
    result?;
    control_result?;

    let s = snapshot(&bb);
    info!(pose = %s.pose, truth = %s.truth, ticks = s.ticks, faults = ?s.faults, "Host loop finished.");
    Ok(())
}

async fn async_runtime(
    bb: Blackboard,
    app: config::AppConfig,
    request_tx: Topic<MotionRequest>,
    telemetry_rx: tokio::sync::broadcast::Receiver<Arc<Telemetry>>,
) -> anyhow::Result<()> {
    info!("Async runtime started.");
    tokio::try_join!(
        mission::mission_task(
            bb.clone(),
            app.mission.requests.clone(),
            request_tx,
            Duration::from_millis(app.timing.motion_timeout_ms),
        ),
        mission::telemetry_task(bb.clone(), telemetry_rx, Duration::from_millis(app.timing.telemetry_ms)),
        watchdog(bb, Duration::from_millis(app.timing.watchdog_ms)),
    )?;
    info!("Async runtime finished.");
    Ok(())
}

async fn watchdog(bb: Blackboard, budget: Duration) -> anyhow::Result<()> {
    info!(?budget, "Watchdog task started.");
    let mut tick = tokio::time::interval(budget / 2);
    while !is_shutdown(&bb) {
        tick.tick().await;
        let last_tick_ts = snapshot(&bb).last_tick_ts;
        let age = Instant::now() - last_tick_ts;
        if age > budget {
            warn!(?age, ?last_tick_ts, "Control tick stalled!");
            raise_fault(&bb, "control tick stalled");
        }
    }
    info!("Watchdog task finished.");
    Ok(())
}
