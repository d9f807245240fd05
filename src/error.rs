//! # Error Types
//!
//! Custom error types for Tello Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Tello Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry record serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any failure reported by the drone backend
    #[error("Drone error: {0}")]
    Drone(String),

    /// A topic name was registered with a different message type
    #[error("Topic {topic} is already registered with a different message type")]
    TopicTypeMismatch { topic: String },

    /// A service name is already served by another server
    #[error("Service {0} is already advertised")]
    ServiceAlreadyAdvertised(String),

    /// No server advertises the requested service
    #[error("Service {0} not found")]
    ServiceNotFound(String),

    /// The service handler reported a failure
    #[error("Service {service} failed: {reason}")]
    ServiceFailed { service: String, reason: String },

    /// The service server went away before answering
    #[error("Service {0} is no longer available")]
    ServiceUnavailable(String),
}

/// Result type alias for Tello Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
