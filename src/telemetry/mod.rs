//! # Telemetry Module
//!
//! Records bridge telemetry to JSONL files with rotation.
//!
//! This module handles:
//! - Subscribing to the scalar telemetry topics
//! - Formatting each message as JSONL (JSON Lines)
//! - Writing to rotating log files
//! - Managing file rotation (max N records per file)
//! - Retaining only last M files
//!
//! Camera frames are not recorded.

pub mod recorder;

pub use recorder::{spawn_recorder, TelemetryLogger};
