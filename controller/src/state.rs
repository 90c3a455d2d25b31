use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};

use crate::timer::SessionTimer;

pub const DEFAULT_DESIRED_TEMP_C: f64 = 70.0;

/// Why the safety machine refuses to energize the heater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockoutReason {
    MaxTemp,
    CeilingOvertemp,
    MaxOnTime,
}

/// Safety machine state. A deadline only exists inside the confirmation
/// window and a reason only inside a lockout, so the illegal flag
/// combinations of a bool-pair encoding cannot occur.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyState {
    Normal,
    ConfirmationWindow { deadline: DateTime<Local> },
    Locked { reason: LockoutReason },
}

impl SafetyState {
    pub fn is_locked(&self) -> bool {
        matches!(self, SafetyState::Locked { .. })
    }

    pub fn lockout_reason(&self) -> Option<LockoutReason> {
        match self {
            SafetyState::Locked { reason } => Some(*reason),
            _ => None,
        }
    }

    pub fn confirmation_deadline(&self) -> Option<DateTime<Local>> {
        match self {
            SafetyState::ConfirmationWindow { deadline } => Some(*deadline),
            _ => None,
        }
    }
}

/// The one shared record. Lives behind the controller's mutex for the whole
/// process lifetime; mutated only by the control loop and the intent setters.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub bench_temp: f64,
    pub ceiling_temp: Option<f64>,
    /// Setpoint in Celsius, clamped to the bench limit.
    pub desired_temp: f64,
    /// Operator permission gate; false forces the relay off.
    pub heater_enabled: bool,
    /// Actual relay state.
    pub heater_on: bool,
    /// Set at the off->on transition, cleared at on->off.
    pub heater_on_since: Option<DateTime<Local>>,
    /// Bench reading at the off->on transition; feeds the rate estimate.
    pub session_start_temp: Option<f64>,
    /// Latched once per session when the bench first reaches the setpoint.
    pub time_to_setpoint: Option<Duration>,
    pub use_display_imperial: bool,
    pub safety: SafetyState,
    /// One-shot pre-heat target; cleared when consumed.
    pub scheduled_start_at: Option<DateTime<Local>>,
    /// EMA of the heat-up rate, degrees C per second.
    pub avg_heatup_rate: Option<f64>,
    pub price_per_kwh: Option<f64>,
    pub heater_power_kw: Option<f64>,
    pub timer: SessionTimer,
    pub last_updated: Option<DateTime<Local>>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            bench_temp: 0.0,
            ceiling_temp: None,
            desired_temp: DEFAULT_DESIRED_TEMP_C,
            heater_enabled: false,
            heater_on: false,
            heater_on_since: None,
            session_start_temp: None,
            time_to_setpoint: None,
            use_display_imperial: false,
            safety: SafetyState::Normal,
            scheduled_start_at: None,
            avg_heatup_rate: None,
            price_per_kwh: None,
            heater_power_kw: None,
            timer: SessionTimer::default(),
            last_updated: None,
        }
    }
}

impl ControllerState {
    /// Structural invariants that must hold whenever the lock is released.
    pub fn invariants_hold(&self) -> bool {
        let session_fields_coupled = self.heater_on == self.heater_on_since.is_some()
            && self.heater_on == self.session_start_temp.is_some();
        let locked_means_off = !(self.safety.is_locked() && self.heater_on);
        let timer_coupled = !self.timer.running || self.timer.started_at.is_some();
        session_fields_coupled && locked_means_off && timer_coupled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_safe() {
        let state = ControllerState::default();
        assert!(!state.heater_enabled);
        assert!(!state.heater_on);
        assert_eq!(state.safety, SafetyState::Normal);
        assert_eq!(state.desired_temp, DEFAULT_DESIRED_TEMP_C);
        assert!(state.heater_on_since.is_none());
        assert!(state.invariants_hold());
    }

    #[test]
    fn invariant_check_catches_decoupled_session_fields() {
        let mut state = ControllerState::default();
        state.heater_on = true;
        assert!(!state.invariants_hold());

        state.heater_on_since = Some(Local::now());
        state.session_start_temp = Some(20.0);
        assert!(state.invariants_hold());

        state.safety = SafetyState::Locked {
            reason: LockoutReason::MaxTemp,
        };
        assert!(!state.invariants_hold());
    }

    #[test]
    fn safety_state_accessors() {
        let normal = SafetyState::Normal;
        assert!(!normal.is_locked());
        assert!(normal.lockout_reason().is_none());
        assert!(normal.confirmation_deadline().is_none());

        let deadline = Local::now();
        let window = SafetyState::ConfirmationWindow { deadline };
        assert_eq!(window.confirmation_deadline(), Some(deadline));

        let locked = SafetyState::Locked {
            reason: LockoutReason::CeilingOvertemp,
        };
        assert!(locked.is_locked());
        assert_eq!(
            locked.lockout_reason(),
            Some(LockoutReason::CeilingOvertemp)
        );
    }

    #[test]
    fn lockout_reason_wire_names() {
        let wire = serde_json::to_string(&LockoutReason::CeilingOvertemp).unwrap();
        assert_eq!(wire, "\"ceiling_overtemp\"");
        let back: LockoutReason = serde_json::from_str("\"max_on_time\"").unwrap();
        assert_eq!(back, LockoutReason::MaxOnTime);
    }
}
