use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use chrono::{DateTime, Duration, Local};
use tracing::{info, warn};

use crate::config::Tuning;
use crate::control::{self, LoopHandle};
use crate::hw::{ActuatorSink, Reading, SensorSource};
use crate::persist::{PersistedConfig, PersistenceStore};
use crate::snapshot::{self, f_to_c, StateSnapshot};
use crate::state::{ControllerState, SafetyState};
use crate::timer::TimerMode;

/// Relay handle plus the state it reflects, under one lock so an intent
/// change and the matching relay write form a single atomic step.
pub(crate) struct Core {
    pub(crate) state: ControllerState,
    pub(crate) relay: Box<dyn ActuatorSink>,
}

struct Inner {
    core: Mutex<Core>,
    tuning: Tuning,
    store: Box<dyn PersistenceStore>,
}

/// Handle shared by the control loop and the web layer. Cheap to clone.
#[derive(Clone)]
pub struct SaunaController {
    inner: Arc<Inner>,
}

impl SaunaController {
    /// Restores persisted settings when a snapshot exists. The safety
    /// machine and the relay always start from scratch.
    pub fn new(
        tuning: Tuning,
        store: Box<dyn PersistenceStore>,
        relay: Box<dyn ActuatorSink>,
    ) -> Self {
        let mut state = ControllerState::default();
        match store.load() {
            Ok(Some(config)) => {
                config.apply_to(&mut state, Local::now());
                state.desired_temp = state.desired_temp.min(tuning.max_temp_c);
                info!("restored settings, setpoint {:.1} C", state.desired_temp);
            }
            Ok(None) => info!("no stored settings, starting with defaults"),
            Err(err) => warn!("could not load stored settings: {err:#}"),
        }
        Self {
            inner: Arc::new(Inner {
                core: Mutex::new(Core { state, relay }),
                tuning,
                store,
            }),
        }
    }

    pub fn tuning(&self) -> &Tuning {
        &self.inner.tuning
    }

    /// Runs one control step against the given reading and clock value.
    /// The loop thread calls this every poll interval.
    pub fn poll(&self, reading: Reading, now: DateTime<Local>) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        let dirty = control::poll_once(
            &mut core.state,
            core.relay.as_mut(),
            reading,
            now,
            &self.inner.tuning,
        );
        if dirty {
            self.save_locked(&core.state);
        }
    }

    fn save_locked(&self, state: &ControllerState) {
        let config = PersistedConfig::capture(state);
        if let Err(err) = self.inner.store.save(&config) {
            warn!("could not persist settings: {err:#}");
        }
    }

    // --- Operator intents ---

    /// Operator on/off switch. Returns false when a lockout refuses the
    /// enable; a lockout clears only through an explicit disable.
    pub fn set_heater_enabled(&self, enabled: bool) -> bool {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        if enabled {
            if let Some(reason) = core.state.safety.lockout_reason() {
                warn!("enable refused while locked out: {:?}", reason);
                return false;
            }
            if !core.state.heater_enabled {
                core.state.heater_enabled = true;
                info!("heater enabled");
                self.save_locked(&core.state);
            }
        } else {
            if core.state.heater_on {
                core.relay.set_energized(false);
                core.state.heater_on = false;
                core.state.heater_on_since = None;
                core.state.session_start_temp = None;
            }
            core.state.safety = SafetyState::Normal;
            if core.state.heater_enabled {
                core.state.heater_enabled = false;
                info!("heater disabled");
                self.save_locked(&core.state);
            }
        }
        true
    }

    /// Setpoint in the configured display unit, clamped to the bench limit.
    pub fn set_desired_temperature(&self, value: f64) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        let celsius = if core.state.use_display_imperial {
            f_to_c(value)
        } else {
            value
        };
        core.state.desired_temp = celsius.min(self.inner.tuning.max_temp_c);
        core.state.time_to_setpoint = None;
        info!("setpoint {:.1} C", core.state.desired_temp);
        self.save_locked(&core.state);
    }

    /// Flips between Celsius and Fahrenheit display; returns the new
    /// imperial flag.
    pub fn toggle_display_unit(&self) -> bool {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.use_display_imperial = !core.state.use_display_imperial;
        self.save_locked(&core.state);
        core.state.use_display_imperial
    }

    /// Sets or clears the one-shot pre-heat target.
    pub fn set_schedule(&self, start_at: Option<DateTime<Local>>) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.scheduled_start_at = start_at;
        match start_at {
            Some(target) => info!("pre-heat scheduled for {}", target.format("%Y-%m-%d %H:%M")),
            None => info!("pre-heat schedule cleared"),
        }
        self.save_locked(&core.state);
    }

    /// Tariff and heater rating used for the running-cost readout. Both
    /// fields are stored as given; the page always posts the pair.
    pub fn set_cost_config(&self, price_per_kwh: Option<f64>, heater_power_kw: Option<f64>) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.price_per_kwh = price_per_kwh;
        core.state.heater_power_kw = heater_power_kw;
        self.save_locked(&core.state);
    }

    // --- Session timer ---

    pub fn timer_set_mode(&self, mode: TimerMode) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.timer.set_mode(mode);
        self.save_locked(&core.state);
    }

    pub fn timer_set_duration(&self, duration_secs: Option<i64>) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.timer.set_duration(duration_secs.map(Duration::seconds));
        self.save_locked(&core.state);
    }

    pub fn timer_start(&self) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.timer.start(Local::now());
        self.save_locked(&core.state);
    }

    pub fn timer_stop(&self) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.timer.stop(Local::now());
        self.save_locked(&core.state);
    }

    pub fn timer_reset(&self) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.state.timer.reset();
        self.save_locked(&core.state);
    }

    // --- Views ---

    pub fn get_state_snapshot(&self) -> StateSnapshot {
        self.snapshot_at(Local::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Local>) -> StateSnapshot {
        let guard = self.inner.core.lock().unwrap();
        snapshot::project(&guard.state, now)
    }

    // --- Loop thread ---

    /// Starts the control loop on its own thread, polling the given sensor
    /// at the tuned interval until the returned handle is stopped.
    pub fn spawn_loop(&self, sensor: Box<dyn SensorSource>) -> LoopHandle {
        let (stop_tx, stop_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let controller = self.clone();
        let thread =
            thread::spawn(move || control::run_loop(controller, sensor, stop_rx, done_tx));
        LoopHandle::new(stop_tx, done_rx, thread)
    }

    /// De-energizes the relay no matter what the state says. Last action
    /// of the control loop on the way out.
    pub(crate) fn shutdown_relay(&self) {
        let mut guard = self.inner.core.lock().unwrap();
        let core = &mut *guard;
        core.relay.set_energized(false);
        if core.state.heater_on {
            core.state.heater_on = false;
            core.state.heater_on_since = None;
            core.state.session_start_temp = None;
            info!("heater off for shutdown");
        }
    }
}
