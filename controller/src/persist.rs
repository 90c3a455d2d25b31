use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::state::{ControllerState, DEFAULT_DESIRED_TEMP_C};
use crate::timer::TimerMode;

/// The durable subset of the controller state. Safety state is deliberately
/// not here: a process restart always comes up in Normal with the relay off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    #[serde(default = "default_desired_temp")]
    pub desired_temp: f64,
    #[serde(default)]
    pub heater_enabled: bool,
    #[serde(default)]
    pub use_display_imperial: bool,
    /// Epoch seconds, local clock.
    #[serde(default)]
    pub scheduled_start_at: Option<i64>,
    /// Degrees C per second.
    #[serde(default)]
    pub avg_heatup_rate: Option<f64>,
    #[serde(default)]
    pub price_per_kwh: Option<f64>,
    #[serde(default)]
    pub heater_power_kw: Option<f64>,
    #[serde(default)]
    pub timer_mode: TimerMode,
    #[serde(default)]
    pub timer_running: bool,
    #[serde(default)]
    pub timer_elapsed_secs: i64,
    #[serde(default)]
    pub timer_duration_secs: Option<i64>,
}

fn default_desired_temp() -> f64 {
    DEFAULT_DESIRED_TEMP_C
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            desired_temp: DEFAULT_DESIRED_TEMP_C,
            heater_enabled: false,
            use_display_imperial: false,
            scheduled_start_at: None,
            avg_heatup_rate: None,
            price_per_kwh: None,
            heater_power_kw: None,
            timer_mode: TimerMode::default(),
            timer_running: false,
            timer_elapsed_secs: 0,
            timer_duration_secs: None,
        }
    }
}

impl PersistedConfig {
    pub fn capture(state: &ControllerState) -> Self {
        Self {
            desired_temp: state.desired_temp,
            heater_enabled: state.heater_enabled,
            use_display_imperial: state.use_display_imperial,
            scheduled_start_at: state.scheduled_start_at.map(|t| t.timestamp()),
            avg_heatup_rate: state.avg_heatup_rate,
            price_per_kwh: state.price_per_kwh,
            heater_power_kw: state.heater_power_kw,
            timer_mode: state.timer.mode,
            timer_running: state.timer.running,
            timer_elapsed_secs: state.timer.elapsed.num_seconds(),
            timer_duration_secs: state.timer.duration.map(|d| d.num_seconds()),
        }
    }

    /// Overlay the stored fields onto a fresh state. A timer that was
    /// running when the snapshot was taken resumes counting from `now`.
    pub fn apply_to(&self, state: &mut ControllerState, now: DateTime<Local>) {
        state.desired_temp = self.desired_temp;
        state.heater_enabled = self.heater_enabled;
        state.use_display_imperial = self.use_display_imperial;
        state.scheduled_start_at = self
            .scheduled_start_at
            .and_then(|secs| Local.timestamp_opt(secs, 0).single());
        state.avg_heatup_rate = self.avg_heatup_rate;
        state.price_per_kwh = self.price_per_kwh;
        state.heater_power_kw = self.heater_power_kw;

        state.timer.mode = self.timer_mode;
        state.timer.elapsed = Duration::seconds(self.timer_elapsed_secs.max(0));
        state.timer.duration = self.timer_duration_secs.map(Duration::seconds);
        if self.timer_running {
            state.timer.running = true;
            state.timer.started_at = Some(now);
        }
    }
}

pub trait PersistenceStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<PersistedConfig>>;
    fn save(&self, config: &PersistedConfig) -> Result<()>;
}

/// Single JSON file. Saves go through a sibling temp file and a rename so a
/// crash mid-write cannot leave a torn snapshot behind.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staged = self.path.as_os_str().to_owned();
        staged.push(".new");
        PathBuf::from(staged)
    }
}

impl PersistenceStore for JsonStore {
    fn load(&self) -> Result<Option<PersistedConfig>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(config))
    }

    fn save(&self, config: &PersistedConfig) -> Result<()> {
        let staged = self.staging_path();
        let raw = serde_json::to_string_pretty(config).context("encoding state")?;
        fs::write(&staged, raw).with_context(|| format!("writing {}", staged.display()))?;
        fs::rename(&staged, &self.path)
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStore").field("path", &self.path).finish()
    }
}
