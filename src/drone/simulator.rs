//! In-process stand-in for a Tello.
//!
//! Enough flight behaviour to exercise the bridge end to end: takeoff and
//! landing change height, rc commands move the vehicle while airborne, the
//! battery drains with time and the camera shows a color-bar test pattern.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{Drone, Frame, RcCommand, TelemetrySample, BGR_BYTES_PER_PIXEL};
use crate::bus::lock;
use crate::config::{DroneConfig, SimulatorConfig, MAX_VIDEO_DIMENSION};
use crate::error::{BridgeError, Result};

/// Height reached by an automatic takeoff (cm)
pub const TAKEOFF_HEIGHT_CM: f64 = 80.0;

/// Largest magnitude accepted on any rc channel
pub const RC_LIMIT: i32 = 100;

/// Vertical acceleration at rest, in thousandths of g
const GRAVITY_MILLI_G: f64 = -1000.0;

/// Color bars in BGR order: white, yellow, cyan, green, magenta, red, blue, black
const COLOR_BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [0, 255, 255],
    [255, 255, 0],
    [0, 255, 0],
    [255, 0, 255],
    [0, 0, 255],
    [255, 0, 0],
    [0, 0, 0],
];

#[derive(Debug)]
struct SimState {
    connected: bool,
    streaming: bool,
    flying: bool,
    battery: f64,
    height_cm: f64,
    rc: RcCommand,
    updated_at: Instant,
}

/// Simulated vehicle implementing [`Drone`].
#[derive(Debug)]
pub struct SimulatedTello {
    state: Mutex<SimState>,
    frame: Frame,
    temperature: f64,
    battery_drain_per_sec: f64,
}

impl SimulatedTello {
    /// Video dimensions above [`MAX_VIDEO_DIMENSION`] are clamped to it.
    pub fn new(drone: &DroneConfig, simulator: &SimulatorConfig) -> Self {
        Self {
            state: Mutex::new(SimState {
                connected: false,
                streaming: false,
                flying: false,
                battery: f64::from(simulator.initial_battery),
                height_cm: 0.0,
                rc: RcCommand::default(),
                updated_at: Instant::now(),
            }),
            frame: color_bars(
                drone.video_width.min(MAX_VIDEO_DIMENSION),
                drone.video_height.min(MAX_VIDEO_DIMENSION),
            ),
            temperature: simulator.temperature,
            battery_drain_per_sec: simulator.battery_drain_per_sec,
        }
    }

    /// Whether the simulated vehicle is airborne
    pub fn is_flying(&self) -> bool {
        lock(&self.state).flying
    }

    /// Last rc command accepted
    pub fn last_rc(&self) -> RcCommand {
        lock(&self.state).rc
    }

    /// Advance the simulation to now and run `f` on the connected state.
    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> Result<T>) -> Result<T> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(BridgeError::Drone("not connected".to_string()));
        }

        let now = Instant::now();
        let dt = now.duration_since(state.updated_at).as_secs_f64();
        state.updated_at = now;

        state.battery = (state.battery - self.battery_drain_per_sec * dt).max(0.0);
        if state.flying {
            state.height_cm = (state.height_cm + f64::from(state.rc.up_down) * dt).max(0.0);
        }

        f(&mut state)
    }
}

#[async_trait]
impl Drone for SimulatedTello {
    async fn connect(&self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            state.connected = true;
            state.updated_at = Instant::now();
            info!("Simulated Tello connected");
        }
        Ok(())
    }

    async fn stream_on(&self) -> Result<()> {
        self.with_state(|state| {
            state.streaming = true;
            debug!("Simulated video stream on");
            Ok(())
        })
    }

    async fn stream_off(&self) -> Result<()> {
        self.with_state(|state| {
            state.streaming = false;
            debug!("Simulated video stream off");
            Ok(())
        })
    }

    async fn telemetry(&self) -> Result<TelemetrySample> {
        self.with_state(|state| {
            let speed = if state.flying {
                [state.rc.forward_back, state.rc.left_right, state.rc.up_down]
            } else {
                [0; 3]
            };

            Ok(TelemetrySample {
                battery: state.battery.ceil() as i32,
                acceleration: [0.0, 0.0, GRAVITY_MILLI_G],
                height: state.height_cm.round() as i32,
                speed,
                temperature: self.temperature,
            })
        })
    }

    async fn latest_frame(&self) -> Result<Option<Frame>> {
        self.with_state(|state| Ok(state.streaming.then(|| self.frame.clone())))
    }

    async fn send_rc_control(&self, command: RcCommand) -> Result<()> {
        self.with_state(|state| {
            state.rc = RcCommand {
                left_right: command.left_right.clamp(-RC_LIMIT, RC_LIMIT),
                forward_back: command.forward_back.clamp(-RC_LIMIT, RC_LIMIT),
                up_down: command.up_down.clamp(-RC_LIMIT, RC_LIMIT),
                yaw: command.yaw.clamp(-RC_LIMIT, RC_LIMIT),
            };
            Ok(())
        })
    }

    async fn takeoff(&self) -> Result<()> {
        self.with_state(|state| {
            if state.flying {
                return Err(BridgeError::Drone("already flying".to_string()));
            }
            state.flying = true;
            state.height_cm = TAKEOFF_HEIGHT_CM;
            info!("Simulated takeoff");
            Ok(())
        })
    }

    async fn land(&self) -> Result<()> {
        self.with_state(|state| {
            if !state.flying {
                return Err(BridgeError::Drone("not flying".to_string()));
            }
            state.flying = false;
            state.height_cm = 0.0;
            state.rc = RcCommand::default();
            info!("Simulated landing");
            Ok(())
        })
    }
}

/// Build a frame of vertical color bars.
fn color_bars(width: u32, height: u32) -> Frame {
    let columns = width as usize;
    let mut row = Vec::with_capacity(columns * BGR_BYTES_PER_PIXEL as usize);
    for x in 0..columns {
        let bar = (x * COLOR_BARS.len()) / columns;
        row.extend_from_slice(&COLOR_BARS[bar]);
    }

    let data = row.repeat(height as usize);
    Frame {
        width,
        height,
        data: Bytes::from(data),
    }
}
