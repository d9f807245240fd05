//! # Tello Bridge Library
//!
//! Expose a Tello quadcopter on a publish/subscribe bus.
//!
//! This library provides the pieces of the bridge: the message types, the
//! in-process bus, the drone capability trait with a simulated vehicle, the
//! bridge loop itself and an optional telemetry recorder.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod drone;
pub mod error;
pub mod msgs;
pub mod telemetry;
