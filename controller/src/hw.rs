use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};

/// One poll's worth of sensor data, degrees C.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub bench_c: f64,
    pub ceiling_c: Option<f64>,
}

/// Temperature input. Implementations must not fail: return a fallback
/// value instead.
pub trait SensorSource: Send {
    fn sample(&mut self) -> Reading;
}

/// Heater relay output. Fire-and-forget; idempotent when re-sent the
/// current state.
pub trait ActuatorSink: Send {
    fn set_energized(&mut self, on: bool);
}

/// Slow sine wave for development machines without a real sensor.
/// Bench swings between 20 and 80 C; the ceiling reads a little hotter.
pub struct SyntheticSensor {
    base_c: f64,
    amplitude_c: f64,
    wave_secs: f64,
    ceiling_offset_c: f64,
}

impl SyntheticSensor {
    pub fn new() -> Self {
        Self {
            base_c: 50.0,
            amplitude_c: 30.0,
            wave_secs: 120.0,
            ceiling_offset_c: 3.0,
        }
    }

    fn bench_at(&self, t: DateTime<Local>) -> f64 {
        let secs = t.timestamp_millis() as f64 / 1000.0;
        self.base_c + self.amplitude_c * (secs / self.wave_secs).sin()
    }
}

impl Default for SyntheticSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SyntheticSensor {
    fn sample(&mut self) -> Reading {
        let bench_c = self.bench_at(Local::now());
        Reading {
            bench_c,
            ceiling_c: Some(bench_c + self.ceiling_offset_c),
        }
    }
}

/// Records the commanded relay state. Clones share the same cell, so tests
/// can keep one and hand the other to the controller.
#[derive(Clone)]
pub struct MockRelay {
    energized: Arc<AtomicBool>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            energized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> bool {
        self.energized.load(Ordering::SeqCst)
    }
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorSink for MockRelay {
    fn set_energized(&mut self, on: bool) {
        self.energized.store(on, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn synthetic_wave_stays_in_band() {
        let sensor = SyntheticSensor::new();
        for step in 0..500 {
            let t = Local.timestamp_opt(1_700_000_000 + step * 37, 0).unwrap();
            let bench = sensor.bench_at(t);
            assert!((20.0..=80.0).contains(&bench), "bench {} out of band", bench);
        }
    }

    #[test]
    fn synthetic_ceiling_tracks_bench() {
        let mut sensor = SyntheticSensor::new();
        let reading = sensor.sample();
        let ceiling = reading.ceiling_c.unwrap();
        assert!((ceiling - reading.bench_c - 3.0).abs() < 1e-9);
    }

    #[test]
    fn mock_relay_clones_share_state() {
        let mut relay = MockRelay::new();
        let probe = relay.clone();
        assert!(!probe.state());
        relay.set_energized(true);
        assert!(probe.state());
        relay.set_energized(true); // idempotent
        assert!(probe.state());
        relay.set_energized(false);
        assert!(!probe.state());
    }
}
