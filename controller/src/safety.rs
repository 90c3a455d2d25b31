use chrono::{DateTime, Local};

use crate::config::Tuning;
use crate::state::{LockoutReason, SafetyState};

/// Everything the policy looks at. Copied out of the shared state so the
/// decision stays a pure function.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput {
    pub bench_c: f64,
    pub ceiling_c: Option<f64>,
    pub desired_c: f64,
    pub heater_enabled: bool,
    pub heater_on: bool,
    pub heater_on_since: Option<DateTime<Local>>,
    pub safety: SafetyState,
    pub now: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDecision {
    pub relay_on: bool,
    pub safety: SafetyState,
    /// Set when the expired confirmation window withdraws the operator's
    /// permission along with forcing the relay off.
    pub revoke_enable: bool,
}

/// One poll's safety and regulation decision. Checks run in priority order;
/// the first that fires wins and later ones assume it did not.
pub fn evaluate(input: &PolicyInput, tuning: &Tuning) -> PolicyDecision {
    // 1) Bench sensor at or past the hard limit.
    if input.bench_c >= tuning.max_temp_c {
        return PolicyDecision {
            relay_on: false,
            safety: SafetyState::Locked {
                reason: LockoutReason::MaxTemp,
            },
            revoke_enable: false,
        };
    }

    // 2) Ceiling sensor at or past its own limit.
    if let Some(ceiling) = input.ceiling_c {
        if ceiling >= tuning.ceiling_limit_c {
            return PolicyDecision {
                relay_on: false,
                safety: SafetyState::Locked {
                    reason: LockoutReason::CeilingOvertemp,
                },
                revoke_enable: false,
            };
        }
    }

    // 3) Heater has run continuously past the runtime limit: open the
    //    confirmation window. The relay keeps its state for this cycle.
    if input.safety == SafetyState::Normal {
        if let (true, Some(since)) = (input.heater_on, input.heater_on_since) {
            if input.now.signed_duration_since(since) >= tuning.max_on_time {
                return PolicyDecision {
                    relay_on: input.heater_on,
                    safety: SafetyState::ConfirmationWindow {
                        deadline: input.now + tuning.confirmation_timeout,
                    },
                    revoke_enable: false,
                };
            }
        }
    }

    // 4) The operator let the window lapse.
    if let SafetyState::ConfirmationWindow { deadline } = input.safety {
        if input.now >= deadline {
            return PolicyDecision {
                relay_on: false,
                safety: SafetyState::Locked {
                    reason: LockoutReason::MaxOnTime,
                },
                revoke_enable: true,
            };
        }
    }

    // 5) Regulation. Runs in Normal and inside a still-open confirmation
    //    window; both sensors must be clear of their limits by a full
    //    hysteresis band before the relay may energize.
    if !input.safety.is_locked() && input.heater_enabled {
        let ceiling_allows_on = input
            .ceiling_c
            .map_or(true, |c| c < tuning.ceiling_limit_c - tuning.hysteresis_c);
        let turn_on = input.bench_c < input.desired_c - tuning.hysteresis_c && ceiling_allows_on;
        let turn_off = input.bench_c > input.desired_c + tuning.hysteresis_c || !ceiling_allows_on;

        let relay_on = if turn_on {
            true
        } else if turn_off {
            false
        } else {
            input.heater_on // inside the dead-band: hold
        };
        return PolicyDecision {
            relay_on,
            safety: input.safety,
            revoke_enable: false,
        };
    }

    // 6) Locked, or the operator has not enabled the heater.
    PolicyDecision {
        relay_on: false,
        safety: input.safety,
        revoke_enable: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn input(bench: f64, desired: f64) -> PolicyInput {
        PolicyInput {
            bench_c: bench,
            ceiling_c: None,
            desired_c: desired,
            heater_enabled: true,
            heater_on: false,
            heater_on_since: None,
            safety: SafetyState::Normal,
            now: at(0),
        }
    }

    #[test]
    fn cold_bench_turns_relay_on() {
        let decision = evaluate(&input(50.0, 70.0), &Tuning::default());
        assert!(decision.relay_on);
        assert_eq!(decision.safety, SafetyState::Normal);
    }

    #[test]
    fn hot_bench_turns_relay_off() {
        let mut input = input(72.0, 70.0);
        input.heater_on = true;
        input.heater_on_since = Some(at(-600));
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
    }

    #[test]
    fn dead_band_holds_previous_state() {
        for previous in [false, true] {
            let mut input = input(70.5, 70.0);
            input.heater_on = previous;
            input.heater_on_since = previous.then(|| at(-600));
            let decision = evaluate(&input, &Tuning::default());
            assert_eq!(decision.relay_on, previous);
        }
    }

    #[test]
    fn band_edges_are_exclusive() {
        // Exactly desired - hysteresis and desired + hysteresis both hold.
        for edge in [69.0, 71.0] {
            let mut input = input(edge, 70.0);
            input.heater_on = true;
            input.heater_on_since = Some(at(-600));
            assert!(evaluate(&input, &Tuning::default()).relay_on);
        }
    }

    #[test]
    fn bench_overtemp_locks_even_when_disabled() {
        let mut input = input(91.0, 70.0);
        input.heater_enabled = false;
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert_eq!(
            decision.safety.lockout_reason(),
            Some(LockoutReason::MaxTemp)
        );
    }

    #[test]
    fn bench_limit_outranks_ceiling_limit() {
        let mut input = input(95.0, 70.0);
        input.ceiling_c = Some(100.0);
        let decision = evaluate(&input, &Tuning::default());
        assert_eq!(
            decision.safety.lockout_reason(),
            Some(LockoutReason::MaxTemp)
        );
    }

    #[test]
    fn ceiling_overtemp_locks() {
        let mut input = input(70.0, 70.0);
        input.ceiling_c = Some(93.3);
        input.heater_on = true;
        input.heater_on_since = Some(at(-60));
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert_eq!(
            decision.safety.lockout_reason(),
            Some(LockoutReason::CeilingOvertemp)
        );
    }

    #[test]
    fn ceiling_near_limit_blocks_energize_without_lockout() {
        // 92.5 is inside the ceiling guard band (93.3 - 1.0) but below the
        // hard limit: the relay must drop without tripping a lockout.
        let mut input = input(50.0, 70.0);
        input.ceiling_c = Some(92.5);
        input.heater_on = true;
        input.heater_on_since = Some(at(-60));
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert_eq!(decision.safety, SafetyState::Normal);
    }

    #[test]
    fn runtime_limit_opens_confirmation_window() {
        let tuning = Tuning::default();
        let mut input = input(69.5, 70.0);
        input.heater_on = true;
        input.heater_on_since = Some(at(0) - tuning.max_on_time);
        let decision = evaluate(&input, &tuning);
        // Relay unchanged on the cycle the window opens.
        assert!(decision.relay_on);
        assert_eq!(
            decision.safety.confirmation_deadline(),
            Some(at(0) + tuning.confirmation_timeout)
        );
        assert!(!decision.revoke_enable);
    }

    #[test]
    fn window_does_not_reopen_while_pending() {
        let tuning = Tuning::default();
        let deadline = at(90);
        let mut input = input(69.5, 70.0);
        input.heater_on = true;
        input.heater_on_since = Some(at(0) - tuning.max_on_time);
        input.safety = SafetyState::ConfirmationWindow { deadline };
        input.now = at(10);
        let decision = evaluate(&input, &tuning);
        // Still regulating inside the open window, same deadline.
        assert!(decision.relay_on);
        assert_eq!(decision.safety.confirmation_deadline(), Some(deadline));
    }

    #[test]
    fn expired_window_locks_and_revokes_enable() {
        let mut input = input(69.5, 70.0);
        input.heater_on = true;
        input.heater_on_since = Some(at(-8000));
        input.safety = SafetyState::ConfirmationWindow { deadline: at(90) };
        input.now = at(90);
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert!(decision.revoke_enable);
        assert_eq!(
            decision.safety.lockout_reason(),
            Some(LockoutReason::MaxOnTime)
        );
    }

    #[test]
    fn locked_state_keeps_relay_off() {
        let mut input = input(40.0, 70.0);
        input.safety = SafetyState::Locked {
            reason: LockoutReason::MaxTemp,
        };
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert!(decision.safety.is_locked());
    }

    #[test]
    fn disabled_heater_stays_off() {
        let mut input = input(40.0, 70.0);
        input.heater_enabled = false;
        let decision = evaluate(&input, &Tuning::default());
        assert!(!decision.relay_on);
        assert_eq!(decision.safety, SafetyState::Normal);
    }

    #[test]
    fn runtime_just_under_limit_keeps_running() {
        let tuning = Tuning::default();
        let mut input = input(69.5, 70.0);
        input.heater_on = true;
        input.heater_on_since = Some(at(0) - tuning.max_on_time + Duration::seconds(1));
        let decision = evaluate(&input, &tuning);
        assert!(decision.relay_on);
        assert_eq!(decision.safety, SafetyState::Normal);
    }

    proptest! {
        // The relay never energizes with either sensor at or past its limit,
        // whatever the rest of the state says.
        #[test]
        fn never_energizes_past_a_limit(
            bench in 0.0f64..150.0,
            ceiling in proptest::option::of(0.0f64..150.0),
            desired in 40.0f64..90.0,
            enabled in any::<bool>(),
            was_on in any::<bool>(),
        ) {
            let tuning = Tuning::default();
            let input = PolicyInput {
                bench_c: bench,
                ceiling_c: ceiling,
                desired_c: desired,
                heater_enabled: enabled,
                heater_on: was_on,
                heater_on_since: was_on.then(|| at(-60)),
                safety: SafetyState::Normal,
                now: at(0),
            };
            let decision = evaluate(&input, &tuning);
            if bench >= tuning.max_temp_c || ceiling.map_or(false, |c| c >= tuning.ceiling_limit_c) {
                prop_assert!(!decision.relay_on);
                prop_assert!(decision.safety.is_locked());
            }
            if decision.relay_on {
                prop_assert!(enabled);
                prop_assert!(bench < tuning.max_temp_c);
            }
        }
    }
}
