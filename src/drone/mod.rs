//! # Drone Module
//!
//! Capability boundary between the bridge and the vehicle SDK.
//!
//! This module handles:
//! - The [`Drone`] trait: connect, stream on/off, telemetry snapshot, latest
//!   camera frame, raw rc command, takeoff and land
//! - The plain data the trait exchanges ([`TelemetrySample`], [`Frame`],
//!   [`RcCommand`])
//! - A simulated vehicle implementing the trait
//!
//! The bridge never looks behind this trait. Link framing, acknowledgement,
//! and video decoding belong to whatever implements it.

pub mod simulator;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use simulator::SimulatedTello;

/// Bytes per pixel of a BGR frame
pub const BGR_BYTES_PER_PIXEL: u32 = 3;

/// One read of every scalar the vehicle reports.
///
/// Values are raw SDK units: battery in percent, acceleration in
/// thousandths of g, height in centimeters, speeds as reported by the
/// vehicle, temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetrySample {
    pub battery: i32,
    pub acceleration: [f64; 3],
    pub height: i32,
    pub speed: [i32; 3],
    pub temperature: f64,
}

/// Decoded camera frame, packed BGR rows without padding.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

impl Frame {
    /// Row length in bytes
    pub fn step(&self) -> u32 {
        self.width.saturating_mul(BGR_BYTES_PER_PIXEL)
    }
}

/// Raw four-channel rc command, in the order the SDK takes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RcCommand {
    pub left_right: i32,
    pub forward_back: i32,
    pub up_down: i32,
    pub yaw: i32,
}

/// Vehicle capabilities the bridge relies on.
///
/// Every call may block for as long as the vehicle takes to answer; no
/// timeouts are applied on this side. Failures surface as
/// [`BridgeError::Drone`](crate::error::BridgeError::Drone).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Drone: Send + Sync {
    /// Establish the control link
    async fn connect(&self) -> Result<()>;

    /// Start the video stream
    async fn stream_on(&self) -> Result<()>;

    /// Stop the video stream
    async fn stream_off(&self) -> Result<()>;

    /// Latest telemetry snapshot
    async fn telemetry(&self) -> Result<TelemetrySample>;

    /// Most recent decoded frame, `None` until the first one arrives
    async fn latest_frame(&self) -> Result<Option<Frame>>;

    /// Forward a raw rc command
    async fn send_rc_control(&self, command: RcCommand) -> Result<()>;

    async fn takeoff(&self) -> Result<()>;

    async fn land(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_step() {
        let frame = Frame {
            width: 960,
            height: 720,
            data: Bytes::new(),
        };
        assert_eq!(frame.step(), 2880);
    }

    #[test]
    fn test_default_rc_command_is_neutral() {
        let command = RcCommand::default();
        assert_eq!(
            (command.left_right, command.forward_back, command.up_down, command.yaw),
            (0, 0, 0, 0)
        );
    }
}
