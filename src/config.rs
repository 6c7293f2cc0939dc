use std::str::FromStr;

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use smartmouse_control::{MotionRequest, SteeringGains};
use smartmouse_kinematics::{Direction, RobotConfig};
use smartmouse_motor::PidGains;
use tracing::{debug, info};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const PROFILE_VAR: &str = "SMARTMOUSE_PROFILE";

/// Everything the host binary reads from configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub robot: RobotConfig,
    pub pid: PidGains,
    pub steering: SteeringGains,
    pub sim: SimConfig,
    pub mission: MissionConfig,
    #[serde(rename = "loop")]
    pub timing: LoopConfig,
}

/// The corridor plant.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Corridor length in cells, running east from column 0.
    pub corridor_cells: usize,
    /// Row the corridor occupies.
    pub corridor_row: usize,
    /// Time constant of the first-order wheel model (s).
    pub motor_time_constant_s: f64,
    /// Steady-state wheel speed per unit of force (rad/s).
    pub motor_gain: f64,
    /// Ground speed of the right wheel relative to its encoder, to make odometry drift.
    pub right_wheel_slip: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            corridor_cells: 6,
            corridor_row: 0,
            motor_time_constant_s: 0.02,
            motor_gain: 1515.0,
            right_wheel_slip: 1.0,
        }
    }
}

/// Where the robot starts and what it is asked to do.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub start_col: usize,
    pub start_row: usize,
    /// One of `N`, `E`, `S`, `W`.
    pub start_facing: String,
    pub requests: Vec<MotionRequest>,
}

impl Default for MissionConfig {
    fn default() -> Self {
        MissionConfig {
            start_col: 0,
            start_row: 0,
            start_facing: "E".into(),
            requests: vec![MotionRequest::Forward(1), MotionRequest::Stop],
        }
    }
}

impl MissionConfig {
    /// Heading at the start cell. An unknown heading is a fatal configuration error.
    pub fn facing(&self) -> anyhow::Result<Direction> {
        Direction::from_str(&self.start_facing)
            .with_context(|| format!("mission.start_facing = {:?}", self.start_facing))
    }
}

/// Timing of the control thread and the async tasks.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Control tick period (us).
    pub period_us: u64,
    /// The watchdog faults when no tick completes within this budget (ms).
    pub watchdog_ms: u64,
    /// Telemetry log period (ms).
    pub telemetry_ms: u64,
    /// The mission gives up on a motion request after this long (ms).
    pub motion_timeout_ms: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig { period_us: 1_000, watchdog_ms: 50, telemetry_ms: 250, motion_timeout_ms: 15_000 }
    }
}

/// Load `config/default.toml`, the optional profile file, then `SMARTMOUSE__*` overrides.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let profile = std::env::var(PROFILE_VAR).unwrap_or_else(|_| "sim".into());
    info!(%profile, "Loading configuration from {}", DEFAULT_CONFIG_PATH);

    let settings = Config::builder()
        .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Toml).required(true))
        .add_source(File::new(&format!("config/{profile}.toml"), FileFormat::Toml).required(false))
        .add_source(
            Environment::with_prefix("SMARTMOUSE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("reading configuration")?;

    let app: AppConfig = settings.try_deserialize().context("parsing configuration")?;
    app.robot.validate().context("robot configuration")?;
    let t = &app.timing;
    anyhow::ensure!(
        t.period_us > 0 && t.watchdog_ms > 0 && t.telemetry_ms > 0,
        "loop periods must be positive: {t:?}"
    );
    anyhow::ensure!(app.sim.corridor_cells > 0, "the corridor needs at least one cell");
    // fail before any thread starts
    app.mission.facing()?;
    debug!(?app, "Configuration loaded");
    Ok(app)
}
