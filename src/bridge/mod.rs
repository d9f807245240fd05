//! # Bridge Module
//!
//! Exposes one drone on the bus.
//!
//! This module handles:
//! - Connecting to the drone and starting its video stream
//! - Registering the telemetry topics, the velocity command topic and the
//!   takeoff/land services
//! - Announcing the fixed world-to-body transform once
//! - Publishing a telemetry snapshot on every cycle of a fixed-rate loop
//! - Forwarding inbound commands to the drone as they arrive
//! - Stopping the video stream on shutdown

pub mod mapping;

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::bus::{Bus, Publisher, ServiceServer, Subscription};
use crate::config::BridgeConfig;
use crate::drone::Drone;
use crate::error::Result;
use crate::msgs::geometry_msgs::{TransformStamped, Twist, TwistStamped};
use crate::msgs::sensor_msgs::{BatteryState, Image, Imu, Range};
use crate::msgs::std_msgs::{StringMsg, Time};
use crate::msgs::std_srvs::{EmptyRequest, EmptyResponse};

/// Topic and service names.
pub mod topics {
    pub const BATTERY: &str = "/tello/battery";
    pub const IMU: &str = "/tello/imu";
    pub const HEIGHT: &str = "/tello/height";
    pub const VELOCITY: &str = "/tello/velocity";
    pub const TEMPERATURE: &str = "/tello/temperature";
    pub const CAMERA: &str = "/tello/camera";
    pub const CMD_VEL: &str = "/tello/cmd_vel";
    pub const TAKEOFF: &str = "/tello/takeoff";
    pub const LAND: &str = "/tello/land";
    pub const TF_STATIC: &str = "/tf_static";
}

/// Publishers for everything read on a cycle.
#[derive(Debug, Clone)]
pub struct StatePublishers {
    pub battery: Publisher<BatteryState>,
    pub imu: Publisher<Imu>,
    pub height: Publisher<Range>,
    pub velocity: Publisher<TwistStamped>,
    pub temperature: Publisher<StringMsg>,
    pub camera: Publisher<Image>,
}

impl StatePublishers {
    /// Register the six outbound topics.
    pub fn register(bus: &Bus, config: &BridgeConfig) -> Result<Self> {
        let depth = config.telemetry_queue_size;
        Ok(Self {
            battery: bus.publisher(topics::BATTERY, depth)?,
            imu: bus.publisher(topics::IMU, depth)?,
            height: bus.publisher(topics::HEIGHT, depth)?,
            velocity: bus.publisher(topics::VELOCITY, depth)?,
            temperature: bus.publisher(topics::TEMPERATURE, depth)?,
            camera: bus.publisher(topics::CAMERA, config.camera_queue_size)?,
        })
    }
}

/// What a cycle needs: the drone, where to publish, and the body frame.
pub struct BridgeContext<D> {
    pub drone: Arc<D>,
    pub publishers: StatePublishers,
    pub frame_id: String,
}

/// Read one telemetry snapshot and the latest frame, then publish them.
///
/// Readings are published as they come back; nothing checks how fresh they
/// are. Without a frame yet the camera topic is skipped for this cycle.
///
/// # Errors
///
/// Returns the drone's error if any read fails. Nothing is published then.
pub async fn publish_state<D: Drone>(ctx: &BridgeContext<D>) -> Result<()> {
    let sample = ctx.drone.telemetry().await?;
    let frame = ctx.drone.latest_frame().await?;
    let stamp = Time::now();
    let frame_id = ctx.frame_id.as_str();
    let publishers = &ctx.publishers;

    publishers.battery.publish(mapping::battery_state(&sample));
    publishers.imu.publish(mapping::imu(&sample, stamp, frame_id));
    publishers.height.publish(mapping::height_range(&sample, stamp, frame_id));
    publishers.velocity.publish(mapping::velocity(&sample, stamp, frame_id));
    publishers.temperature.publish(mapping::temperature(&sample));

    match frame {
        Some(frame) => {
            publishers.camera.publish(mapping::camera_image(frame, stamp));
        }
        None => debug!("No camera frame yet, skipping image"),
    }

    trace!("Published state: {:?}", sample);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Takeoff,
    Land,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Takeoff => write!(f, "takeoff"),
            Action::Land => write!(f, "land"),
        }
    }
}

/// Forward every inbound velocity command, in arrival order.
///
/// A rejected command is logged and the next one is forwarded as usual.
async fn forward_velocity_commands<D: Drone>(drone: Arc<D>, mut commands: Subscription<Twist>) {
    while let Some(twist) = commands.recv().await {
        let command = mapping::rc_command(&twist);
        debug!("Forwarding rc command {:?}", command);

        if let Err(e) = drone.send_rc_control(command).await {
            warn!("Drone rejected rc command {:?}: {}", command, e);
        }
    }
}

/// Answer takeoff or land requests with one drone call each.
async fn serve_action<D: Drone>(
    drone: Arc<D>,
    mut server: ServiceServer<EmptyRequest, EmptyResponse>,
    action: Action,
) {
    while let Some(call) = server.next().await {
        info!("{} requested on {}", action, server.name());

        let result = match action {
            Action::Takeoff => drone.takeoff().await,
            Action::Land => drone.land().await,
        };

        call.respond(result.map(|()| EmptyResponse).map_err(|e| {
            warn!("{} failed: {}", action, e);
            e.to_string()
        }));
    }
}

/// A drone exposed on a bus.
///
/// Created by [`TelloBridge::start`], driven by [`TelloBridge::run`].
pub struct TelloBridge<D> {
    ctx: BridgeContext<D>,
    period: Duration,
    handlers: JoinSet<()>,
}

impl<D: Drone + 'static> TelloBridge<D> {
    /// Connect to the drone and register everything on the bus.
    ///
    /// # Errors
    ///
    /// Fails without retrying if the drone cannot connect or start its video
    /// stream, or if a name is already taken on the bus.
    pub async fn start(drone: Arc<D>, bus: &Bus, config: &BridgeConfig) -> Result<Self> {
        info!("Connecting to drone...");
        drone.connect().await?;
        drone.stream_on().await?;
        info!("Drone connected, video stream on");

        let publishers = StatePublishers::register(bus, config)?;
        let cmd_vel = bus.subscribe::<Twist>(topics::CMD_VEL)?;
        let takeoff = bus.advertise::<EmptyRequest, EmptyResponse>(topics::TAKEOFF)?;
        let land = bus.advertise::<EmptyRequest, EmptyResponse>(topics::LAND)?;

        let tf_static = bus.latched_publisher::<TransformStamped>(topics::TF_STATIC)?;
        tf_static.publish(mapping::static_transform(
            &config.world_frame_id,
            &config.frame_id,
            Time::now(),
        ));
        info!(
            "Published static transform {} -> {}",
            config.world_frame_id, config.frame_id
        );

        let mut handlers = JoinSet::new();
        handlers.spawn(forward_velocity_commands(Arc::clone(&drone), cmd_vel));
        handlers.spawn(serve_action(Arc::clone(&drone), takeoff, Action::Takeoff));
        handlers.spawn(serve_action(Arc::clone(&drone), land, Action::Land));

        Ok(Self {
            ctx: BridgeContext {
                drone,
                publishers,
                frame_id: config.frame_id.clone(),
            },
            period: Duration::from_secs_f64(1.0 / f64::from(config.publish_rate_hz.max(1))),
            handlers,
        })
    }

    /// Publish one cycle of state.
    pub async fn publish_state(&self) -> Result<()> {
        publish_state(&self.ctx).await
    }

    /// Time between two cycles
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Publishers the loop writes to
    pub fn publishers(&self) -> &StatePublishers {
        &self.ctx.publishers
    }

    /// Publish state every period until `shutdown` resolves or a read fails.
    ///
    /// A cycle that overruns pushes the following ones back; missed cycles
    /// are not caught up. On exit the command handlers are stopped and the
    /// video stream is turned off. The vehicle is otherwise left as it is.
    ///
    /// # Errors
    ///
    /// Returns the first failed read, or the failure to stop the stream.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!("Publishing state every {:?}", self.period);
        let mut cycles: u64 = 0;

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested after {} cycle(s)", cycles);
                    break Ok(());
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.publish_state().await {
                        error!("Failed to read drone state: {}", e);
                        break Err(e);
                    }
                    cycles += 1;
                }
            }
        };

        self.handlers.shutdown().await;

        info!("Stopping video stream");
        let stopped = self.ctx.drone.stream_off().await;
        result?;
        stopped
    }
}
