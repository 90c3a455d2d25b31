use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use sauna_controller::ActuatorSink;
use tracing::warn;

/// Heater contactor on a sysfs GPIO line. The relay board pulls the line
/// low to energize the coil, so "0" means heat.
pub struct GpioRelay {
    pin: u32,
    value_path: PathBuf,
}

impl GpioRelay {
    pub fn new(pin: u32) -> Result<Self> {
        Self::with_base(Path::new("/sys/class/gpio"), pin)
    }

    fn with_base(base: &Path, pin: u32) -> Result<Self> {
        let gpio_dir = base.join(format!("gpio{pin}"));
        if !gpio_dir.exists() {
            fs::write(base.join("export"), pin.to_string())
                .with_context(|| format!("exporting gpio {pin}"))?;
            // The kernel needs a moment to create the pin directory.
            thread::sleep(Duration::from_millis(100));
        }
        fs::write(gpio_dir.join("direction"), "out")
            .with_context(|| format!("setting gpio {pin} direction"))?;

        let relay = Self {
            pin,
            value_path: gpio_dir.join("value"),
        };
        relay
            .write(level_for(false))
            .with_context(|| format!("driving gpio {pin} to its off level"))?;
        Ok(relay)
    }

    fn write(&self, level: &str) -> std::io::Result<()> {
        fs::write(&self.value_path, level)
    }
}

/// Line level for a wanted relay state.
pub fn level_for(energized: bool) -> &'static str {
    if energized {
        "0"
    } else {
        "1"
    }
}

impl ActuatorSink for GpioRelay {
    fn set_energized(&mut self, on: bool) {
        if let Err(err) = self.write(level_for(on)) {
            warn!("gpio {} write failed: {err}", self.pin);
        }
    }
}

impl Drop for GpioRelay {
    fn drop(&mut self) {
        let _ = self.write(level_for(false));
    }
}
