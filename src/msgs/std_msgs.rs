//! `std_msgs` equivalents: timestamps, headers and plain strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock timestamp split into seconds and nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: i64,
    pub nanosec: u32,
}

impl Time {
    /// Current wall-clock time
    pub fn now() -> Self {
        Self::from(Utc::now())
    }
}

impl From<DateTime<Utc>> for Time {
    fn from(instant: DateTime<Utc>) -> Self {
        Self {
            sec: instant.timestamp(),
            nanosec: instant.timestamp_subsec_nanos(),
        }
    }
}

/// Stamp and coordinate frame shared by most messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// Plain text message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringMsg {
    pub data: String,
}
