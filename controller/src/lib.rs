//! Bang-bang sauna heater control with a dual-sensor safety interlock.
//!
//! [`SaunaController`] owns the relay and the shared state. A control-loop
//! thread feeds it sensor readings at a fixed interval; the web layer reads
//! display snapshots and posts operator intents. Hardware sits behind the
//! [`hw`] traits so the whole control path runs against mocks in tests.

pub mod config;
pub mod control;
pub mod controller;
pub mod hw;
pub mod persist;
pub mod safety;
pub mod scheduler;
pub mod snapshot;
pub mod state;
pub mod timer;

pub use config::Tuning;
pub use control::LoopHandle;
pub use controller::SaunaController;
pub use hw::{ActuatorSink, MockRelay, Reading, SensorSource, SyntheticSensor};
pub use persist::{JsonStore, PersistedConfig, PersistenceStore};
pub use snapshot::StateSnapshot;
pub use state::{LockoutReason, SafetyState};
pub use timer::TimerMode;
