//! # Message Types
//!
//! Plain data mirrors of the standard robotics message kinds the bridge
//! publishes and consumes.
//!
//! Field names follow the usual `std_msgs`, `geometry_msgs`, `sensor_msgs`
//! and `std_srvs` layouts so that anything consuming the bus can map them
//! onto a real middleware without renaming.

pub mod geometry_msgs;
pub mod sensor_msgs;
pub mod std_msgs;
pub mod std_srvs;
