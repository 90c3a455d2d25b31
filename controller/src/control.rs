use std::sync::mpsc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::config::Tuning;
use crate::controller::SaunaController;
use crate::hw::{ActuatorSink, Reading, SensorSource};
use crate::safety::{self, PolicyInput};
use crate::scheduler;
use crate::snapshot::format_duration;
use crate::state::{ControllerState, SafetyState};

/// How long `LoopHandle::stop` waits for the loop thread to wind down.
const STOP_TIMEOUT: StdDuration = StdDuration::from_secs(2);

// --- Per-poll pipeline ---

/// One control step: fold in a sensor reading, run the safety policy,
/// drive the relay and update the derived session fields. Returns true
/// when a persisted field changed and the state should be written out.
pub(crate) fn poll_once(
    state: &mut ControllerState,
    relay: &mut dyn ActuatorSink,
    reading: Reading,
    now: DateTime<Local>,
    tuning: &Tuning,
) -> bool {
    let mut dirty = false;

    state.bench_temp = reading.bench_c;
    state.ceiling_temp = reading.ceiling_c;
    state.last_updated = Some(now);

    // A pending pre-heat fires in the same step it becomes due, so the
    // policy below already sees the heater as enabled.
    if !state.safety.is_locked() {
        if let Some(target) = state.scheduled_start_at {
            let required = scheduler::required_heat_secs(
                state.desired_temp,
                state.bench_temp,
                state.avg_heatup_rate,
            );
            if scheduler::preheat_due(target, now, required) {
                info!(
                    "pre-heat due, enabling heater {:.0} s ahead of the target",
                    required
                );
                state.heater_enabled = true;
                state.scheduled_start_at = None;
                dirty = true;
            }
        }
    }

    let decision = safety::evaluate(
        &PolicyInput {
            bench_c: state.bench_temp,
            ceiling_c: state.ceiling_temp,
            desired_c: state.desired_temp,
            heater_enabled: state.heater_enabled,
            heater_on: state.heater_on,
            heater_on_since: state.heater_on_since,
            safety: state.safety,
            now,
        },
        tuning,
    );

    if decision.safety != state.safety {
        match decision.safety {
            SafetyState::ConfirmationWindow { deadline } => warn!(
                "continuous-run limit reached, heating pauses at {} unless confirmed",
                deadline.format("%H:%M:%S")
            ),
            SafetyState::Locked { reason } => error!("safety lockout tripped: {:?}", reason),
            SafetyState::Normal => {}
        }
        state.safety = decision.safety;
    }
    if decision.revoke_enable {
        state.heater_enabled = false;
        dirty = true;
    }

    if decision.relay_on != state.heater_on {
        relay.set_energized(decision.relay_on);
        state.heater_on = decision.relay_on;
        if decision.relay_on {
            state.heater_on_since = Some(now);
            state.session_start_temp = Some(state.bench_temp);
            state.time_to_setpoint = None;
            info!(
                "heater on, bench {:.1} C, setpoint {:.1} C",
                state.bench_temp, state.desired_temp
            );
        } else {
            state.heater_on_since = None;
            state.session_start_temp = None;
            info!("heater off, bench {:.1} C", state.bench_temp);
        }
    }

    // First step of a session at or above the setpoint: latch the heat-up
    // time and fold a rate sample into the running estimate.
    if state.heater_on
        && state.time_to_setpoint.is_none()
        && state.bench_temp >= state.desired_temp
    {
        if let (Some(since), Some(start_c)) = (state.heater_on_since, state.session_start_temp) {
            let elapsed = now.signed_duration_since(since);
            state.time_to_setpoint = Some(elapsed);
            if let Some(sample) = scheduler::rate_sample(start_c, state.bench_temp, elapsed) {
                let merged =
                    scheduler::merge_rate(state.avg_heatup_rate, sample, tuning.heatup_rate_alpha);
                state.avg_heatup_rate = Some(merged);
                dirty = true;
                info!(
                    "setpoint reached after {}, heat-up rate {:.1} C/h",
                    format_duration(elapsed),
                    merged * 3600.0
                );
            }
        }
    }

    if state.timer.accrue(now) {
        info!("session timer finished");
        dirty = true;
    }

    debug_assert!(state.invariants_hold());
    dirty
}

// --- Loop thread ---

pub(crate) fn run_loop(
    controller: SaunaController,
    mut sensor: Box<dyn SensorSource>,
    stop_rx: mpsc::Receiver<()>,
    done_tx: mpsc::Sender<()>,
) {
    let interval = controller.tuning().control_interval;
    loop {
        let reading = sensor.sample();
        controller.poll(reading, Local::now());
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            _ => break,
        }
    }
    controller.shutdown_relay();
    let _ = done_tx.send(());
}

/// Owner handle for the control-loop thread.
pub struct LoopHandle {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
    thread: thread::JoinHandle<()>,
}

impl LoopHandle {
    pub(crate) fn new(
        stop_tx: mpsc::Sender<()>,
        done_rx: mpsc::Receiver<()>,
        thread: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            stop_tx,
            done_rx,
            thread,
        }
    }

    /// Ask the loop to stop and wait briefly for the relay to be released.
    /// A loop wedged in a sensor read is abandoned rather than holding up
    /// process shutdown.
    pub fn stop(self) {
        let _ = self.stop_tx.send(());
        match self.done_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("control loop did not stop in time, abandoning its thread");
            }
        }
    }
}
