use std::fs;
use std::path::{Path, PathBuf};

use sauna_controller::{Reading, SensorSource};
use tracing::{info, warn};

/// Bench value reported while the sensor misbehaves before ever having
/// produced a good sample.
const AMBIENT_FALLBACK_C: f64 = 20.0;

/// One DS18B20 slave on the 1-Wire bus.
struct W1Device {
    name: String,
    path: PathBuf,
    last_c: Option<f64>,
    failing: bool,
}

impl W1Device {
    fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            last_c: None,
            failing: false,
        }
    }

    /// Reads the sysfs slave file, holding the last good value through CRC
    /// glitches. Logs only on the failing and recovering edges so a flaky
    /// sensor cannot flood the journal.
    fn read(&mut self) -> Option<f64> {
        let parsed = fs::read_to_string(&self.path)
            .ok()
            .as_deref()
            .and_then(parse_w1_payload);
        match parsed {
            Some(value) => {
                if self.failing {
                    info!("sensor {} recovered at {:.1} C", self.name, value);
                    self.failing = false;
                }
                self.last_c = Some(value);
                Some(value)
            }
            None => {
                if !self.failing {
                    warn!("sensor {} read failed, holding last value", self.name);
                    self.failing = true;
                }
                self.last_c
            }
        }
    }
}

/// DS18B20 pair found on the bus. The first device in id order is the
/// bench sensor; a second one, when wired, watches the ceiling.
pub struct W1Sensors {
    bench: W1Device,
    ceiling: Option<W1Device>,
}

impl W1Sensors {
    pub fn discover(base_dir: &Path) -> Option<Self> {
        let mut names: Vec<String> = fs::read_dir(base_dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("28-"))
            .collect();
        names.sort();

        let mut devices = names
            .into_iter()
            .map(|name| {
                let path = base_dir.join(&name).join("w1_slave");
                W1Device::new(name, path)
            })
            .filter(|device| device.path.is_file());

        let bench = devices.next()?;
        let ceiling = devices.next();
        Some(Self { bench, ceiling })
    }

    pub fn describe(&self) -> String {
        match &self.ceiling {
            Some(ceiling) => format!("bench {}, ceiling {}", self.bench.name, ceiling.name),
            None => format!("bench {}, no ceiling sensor", self.bench.name),
        }
    }
}

impl SensorSource for W1Sensors {
    fn sample(&mut self) -> Reading {
        let bench_c = self.bench.read().unwrap_or(AMBIENT_FALLBACK_C);
        let ceiling_c = self.ceiling.as_mut().and_then(|device| device.read());
        Reading { bench_c, ceiling_c }
    }
}

/// Parses a `w1_slave` payload:
///
/// ```text
/// 6e 01 4b 46 7f ff 02 10 71 : crc=71 YES
/// 6e 01 4b 46 7f ff 02 10 71 t=22875
/// ```
///
/// The first line must carry the CRC verdict, the second the reading in
/// milli-degrees.
pub fn parse_w1_payload(raw: &str) -> Option<f64> {
    let mut lines = raw.lines();
    if !lines.next()?.trim_end().ends_with("YES") {
        return None;
    }
    let milli: f64 = lines.next()?.rsplit("t=").next()?.trim().parse().ok()?;
    Some(milli / 1000.0)
}
