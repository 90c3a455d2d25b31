pub mod gpio;
pub mod w1;
pub mod web;

use std::path::Path;

use anyhow::{Context, Result};
use sauna_controller::{
    ActuatorSink, JsonStore, MockRelay, SaunaController, SensorSource, SyntheticSensor, Tuning,
};
use tracing::{info, warn};

use crate::gpio::GpioRelay;
use crate::w1::W1Sensors;

// --- Installation constants ---
const BIND_ADDR: &str = "0.0.0.0:8080";
const STATE_PATH: &str = "sauna_state.json";
const RELAY_GPIO: u32 = 17;
const W1_DEVICES_DIR: &str = "/sys/bus/w1/devices";

/// Real hardware when the 1-Wire bus has sensors, otherwise a synthetic
/// cabin and a mock relay so the server runs on a development machine.
fn detect_hardware() -> Result<(Box<dyn SensorSource>, Box<dyn ActuatorSink>)> {
    match W1Sensors::discover(Path::new(W1_DEVICES_DIR)) {
        Some(sensors) => {
            info!("1-Wire sensors: {}", sensors.describe());
            let relay = GpioRelay::new(RELAY_GPIO)
                .with_context(|| format!("setting up the relay on gpio {RELAY_GPIO}"))?;
            Ok((Box::new(sensors), Box::new(relay)))
        }
        None => {
            warn!("no 1-Wire sensors found, running with synthetic hardware");
            Ok((Box::new(SyntheticSensor::new()), Box::new(MockRelay::new())))
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let tuning = Tuning::default();
    tuning.validate()?;

    let (sensor, relay) = detect_hardware()?;
    let controller = SaunaController::new(tuning, Box::new(JsonStore::new(STATE_PATH)), relay);
    let loop_handle = controller.spawn_loop(sensor);

    let app = web::router(controller);
    info!("listening on http://{BIND_ADDR}");
    let listener = tokio::net::TcpListener::bind(BIND_ADDR)
        .await
        .with_context(|| format!("binding {BIND_ADDR}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("web server")?;

    // The web server is down; release the relay before the process exits.
    loop_handle.stop();
    Ok(())
}
