use chrono::{DateTime, Duration, Local};
use serde::Serialize;

use crate::state::{ControllerState, LockoutReason, SafetyState};
use crate::timer::TimerMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaterStatus {
    Off,
    Heating,
    Standby,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimerSnapshot {
    pub mode: TimerMode,
    pub running: bool,
    /// Elapsed (stopwatch) or remaining (countdown) time, `HH:MM:SS`.
    pub display: String,
    pub duration_secs: Option<i64>,
}

/// Display-ready copy of the controller state. Temperatures are in the
/// configured display unit; everything here is derived, nothing is shared.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub bench_temp: f64,
    pub ceiling_temp: Option<f64>,
    pub desired_temp: f64,
    pub use_display_imperial: bool,
    pub display_unit: &'static str,
    pub status: HeaterStatus,
    pub heater_enabled: bool,
    pub heater_on: bool,
    pub heater_on_for: Option<String>,
    pub time_to_setpoint: Option<String>,
    pub lockout_active: bool,
    pub lockout_reason: Option<LockoutReason>,
    pub confirmation_required: bool,
    pub confirmation_remaining_secs: Option<i64>,
    pub scheduled_start_at: Option<i64>,
    pub avg_heatup_rate_c_per_hour: Option<f64>,
    /// Energy cost of the running session so far; needs both cost inputs.
    pub estimated_cost: Option<f64>,
    pub timer: TimerSnapshot,
    pub last_updated: Option<i64>,
}

pub fn project(state: &ControllerState, now: DateTime<Local>) -> StateSnapshot {
    let in_display_unit = |celsius: f64| {
        if state.use_display_imperial {
            round1(c_to_f(celsius))
        } else {
            round1(celsius)
        }
    };

    let status = if !state.heater_enabled {
        HeaterStatus::Off
    } else if state.heater_on {
        HeaterStatus::Heating
    } else {
        HeaterStatus::Standby
    };

    let confirmation_remaining_secs = state
        .safety
        .confirmation_deadline()
        .map(|deadline| deadline.signed_duration_since(now).num_seconds().max(0));

    let estimated_cost = match (
        state.heater_on_since,
        state.price_per_kwh,
        state.heater_power_kw,
    ) {
        (Some(since), Some(price), Some(power)) => {
            let hours = now.signed_duration_since(since).num_milliseconds() as f64 / 3_600_000.0;
            Some(round2(power * hours.max(0.0) * price))
        }
        _ => None,
    };

    StateSnapshot {
        bench_temp: in_display_unit(state.bench_temp),
        ceiling_temp: state.ceiling_temp.map(in_display_unit),
        desired_temp: in_display_unit(state.desired_temp),
        use_display_imperial: state.use_display_imperial,
        display_unit: if state.use_display_imperial { "F" } else { "C" },
        status,
        heater_enabled: state.heater_enabled,
        heater_on: state.heater_on,
        heater_on_for: state
            .heater_on_since
            .map(|since| format_duration(now.signed_duration_since(since))),
        time_to_setpoint: state.time_to_setpoint.map(format_duration),
        lockout_active: state.safety.is_locked(),
        lockout_reason: state.safety.lockout_reason(),
        confirmation_required: confirmation_remaining_secs.is_some(),
        confirmation_remaining_secs,
        scheduled_start_at: state.scheduled_start_at.map(|t| t.timestamp()),
        avg_heatup_rate_c_per_hour: state.avg_heatup_rate.map(|rate| round2(rate * 3600.0)),
        estimated_cost,
        timer: TimerSnapshot {
            mode: state.timer.mode,
            running: state.timer.running,
            display: format_duration(state.timer.display_value(now)),
            duration_secs: state.timer.duration.map(|d| d.num_seconds()),
        },
        last_updated: state.last_updated.map(|t| t.timestamp()),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn c_to_f(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn f_to_c(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
