//! # Tello Bridge
//!
//! Expose a Tello quadcopter's telemetry, camera and flight commands on a
//! publish/subscribe bus.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Set up logging with tracing subscriber
//!    - Load configuration (first argument, or defaults)
//!    - Connect to the drone, start video, register topics and services
//!    - Announce the static world-to-body transform
//!
//! 2. **Main Loop**
//!    - Publish battery, IMU, height, velocity, temperature and camera
//!      at the configured rate (30Hz by default)
//!    - Forward velocity commands and takeoff/land requests as they arrive
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C ends the loop within one cycle
//!    - Stop the video stream
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO tello_bridge: Tello Bridge v0.1.0 starting...
//! INFO tello_bridge::bridge: Connecting to drone...
//! INFO tello_bridge::bridge: Published static transform world -> tello_base_link
//! INFO tello_bridge::bridge: Publishing state every 33.333333ms
//! ```

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tello_bridge::bridge::TelloBridge;
use tello_bridge::bus::Bus;
use tello_bridge::config::Config;
use tello_bridge::drone::SimulatedTello;
use tello_bridge::telemetry::spawn_recorder;

/// Load the configuration file if one was given, defaults otherwise.
fn load_config(path: Option<String>) -> Result<Config> {
    match path {
        Some(path) => {
            info!("Loading configuration from {}", path);
            Ok(Config::load(&path)?)
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => warn!("Failed to listen for Ctrl+C ({}), shutting down...", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .init();

    info!("Tello Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(std::env::args().nth(1))?;

    let bus = Bus::new();
    let drone = Arc::new(SimulatedTello::new(&config.drone, &config.simulator));
    let bridge = TelloBridge::start(drone, &bus, &config.bridge).await?;

    let recorder = if config.telemetry.enabled {
        Some(spawn_recorder(&bus, &config.telemetry)?)
    } else {
        None
    };

    info!("Press Ctrl+C to exit");
    bridge.run(wait_for_ctrl_c()).await?;

    if let Some(recorder) = recorder {
        if recorder.is_finished() {
            if let Ok(Err(e)) = recorder.await {
                warn!("Telemetry recorder stopped early: {}", e);
            }
        } else {
            recorder.abort();
        }
    }

    info!("Tello Bridge stopped");
    Ok(())
}
