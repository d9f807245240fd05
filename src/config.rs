//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; a missing value takes its default.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{BridgeError, Result};

/// Telemetry publish cadence in Hz. The loop runs at exactly this rate
/// unless `bridge.publish_rate_hz` overrides it.
pub const DEFAULT_PUBLISH_RATE_HZ: u32 = 30;

/// Largest accepted video width or height (pixels)
pub const MAX_VIDEO_DIMENSION: u32 = 4096;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub drone: DroneConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Bridge loop and naming configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    #[serde(default = "default_publish_rate_hz")]
    pub publish_rate_hz: u32,

    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    #[serde(default = "default_world_frame_id")]
    pub world_frame_id: String,

    #[serde(default = "default_telemetry_queue_size")]
    pub telemetry_queue_size: usize,

    #[serde(default = "default_camera_queue_size")]
    pub camera_queue_size: usize,
}

/// Drone backend configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DroneConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default = "default_video_width")]
    pub video_width: u32,

    #[serde(default = "default_video_height")]
    pub video_height: u32,
}

/// Simulated vehicle configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorConfig {
    #[serde(default = "default_initial_battery")]
    pub initial_battery: u8,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_battery_drain_per_sec")]
    pub battery_drain_per_sec: f64,
}

/// Telemetry recording configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_publish_rate_hz() -> u32 { DEFAULT_PUBLISH_RATE_HZ }
fn default_frame_id() -> String { "tello_base_link".to_string() }
fn default_world_frame_id() -> String { "world".to_string() }
fn default_telemetry_queue_size() -> usize { 10 }
fn default_camera_queue_size() -> usize { 1 }

fn default_backend() -> String { "simulator".to_string() }
fn default_video_width() -> u32 { 960 }
fn default_video_height() -> u32 { 720 }

fn default_initial_battery() -> u8 { 100 }
fn default_temperature() -> f64 { 40.0 }
fn default_battery_drain_per_sec() -> f64 { 0.05 }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            publish_rate_hz: default_publish_rate_hz(),
            frame_id: default_frame_id(),
            world_frame_id: default_world_frame_id(),
            telemetry_queue_size: default_telemetry_queue_size(),
            camera_queue_size: default_camera_queue_size(),
        }
    }
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            video_width: default_video_width(),
            video_height: default_video_height(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            initial_battery: default_initial_battery(),
            temperature: default_temperature(),
            battery_drain_per_sec: default_battery_drain_per_sec(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tello_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Validate bridge configuration
        if self.bridge.publish_rate_hz == 0 || self.bridge.publish_rate_hz > 100 {
            return Err(invalid("publish_rate_hz must be between 1 and 100"));
        }

        if self.bridge.frame_id.is_empty() || self.bridge.world_frame_id.is_empty() {
            return Err(invalid("frame_id and world_frame_id cannot be empty"));
        }

        if self.bridge.frame_id == self.bridge.world_frame_id {
            return Err(invalid("frame_id must differ from world_frame_id"));
        }

        if self.bridge.telemetry_queue_size == 0 || self.bridge.camera_queue_size == 0 {
            return Err(invalid("queue sizes must be greater than 0"));
        }

        // Only the simulated backend exists; the vehicle link lives in the vendor SDK
        if self.drone.backend != "simulator" {
            return Err(invalid(format!(
                "unsupported drone backend '{}' (supported: simulator)",
                self.drone.backend
            )));
        }

        let video = [self.drone.video_width, self.drone.video_height];
        if video.iter().any(|&size| size == 0 || size > MAX_VIDEO_DIMENSION) {
            return Err(invalid(format!(
                "video_width and video_height must be between 1 and {}",
                MAX_VIDEO_DIMENSION
            )));
        }

        // Validate simulator configuration
        if self.simulator.initial_battery > 100 {
            return Err(invalid("initial_battery must be between 0 and 100"));
        }

        let drain = self.simulator.battery_drain_per_sec;
        if !drain.is_finite() || drain < 0.0 {
            return Err(invalid("battery_drain_per_sec must be a non-negative number"));
        }

        if !self.simulator.temperature.is_finite() {
            return Err(invalid("temperature must be a finite number"));
        }

        // Validate telemetry configuration
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bridge.publish_rate_hz, DEFAULT_PUBLISH_RATE_HZ);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.bridge.frame_id, "tello_base_link");
        assert_eq!(config.bridge.world_frame_id, "world");
        assert_eq!(config.drone.backend, "simulator");
        assert!(!config.telemetry.enabled);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[bridge]
publish_rate_hz = 15
frame_id = "drone"

[drone]
video_width = 320
video_height = 240

[simulator]
initial_battery = 80

[telemetry]
enabled = true
log_dir = "/tmp/tello"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.bridge.publish_rate_hz, 15);
        assert_eq!(config.bridge.frame_id, "drone");
        assert_eq!(config.bridge.world_frame_id, "world");
        assert_eq!(config.drone.video_width, 320);
        assert_eq!(config.simulator.initial_battery, 80);
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.log_dir, "/tmp/tello");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/tello-bridge.toml");
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[bridge\npublish_rate_hz = ");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_wrong_field_type() {
        let result = Config::from_toml("[bridge]\npublish_rate_hz = \"fast\"");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_publish_rate_zero() {
        let mut config = Config::default();
        config.bridge.publish_rate_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publish_rate_too_high() {
        let mut config = Config::default();
        config.bridge.publish_rate_hz = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_frame_id() {
        let mut config = Config::default();
        config.bridge.frame_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_ids_must_differ() {
        let mut config = Config::default();
        config.bridge.frame_id = "world".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_queue_size() {
        let mut config = Config::default();
        config.bridge.camera_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unsupported_backend() {
        let mut config = Config::default();
        config.drone.backend = "udp".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported drone backend"));
    }

    #[test]
    fn test_zero_video_size() {
        let mut config = Config::default();
        config.drone.video_height = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_video_size_upper_bound() {
        let mut config = Config::default();
        config.drone.video_width = MAX_VIDEO_DIMENSION;
        config.drone.video_height = MAX_VIDEO_DIMENSION;
        assert!(config.validate().is_ok());

        config.drone.video_width = 1_500_000_000;
        config.drone.video_height = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("video_width and video_height"));

        config.drone.video_width = 960;
        config.drone.video_height = MAX_VIDEO_DIMENSION + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_battery_too_high() {
        let mut config = Config::default();
        config.simulator.initial_battery = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_battery_drain() {
        let mut config = Config::default();
        config.simulator.battery_drain_per_sec = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = Config::default();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = Config::default();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_records_per_file_zero() {
        let mut config = Config::default();
        config.telemetry.max_records_per_file = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_files_to_keep_zero() {
        let mut config = Config::default();
        config.telemetry.max_files_to_keep = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_publish_rate_hz(), 30);
        assert_eq!(default_frame_id(), "tello_base_link");
        assert_eq!(default_world_frame_id(), "world");
        assert_eq!(default_telemetry_queue_size(), 10);
        assert_eq!(default_camera_queue_size(), 1);
        assert_eq!(default_backend(), "simulator");
        assert_eq!(default_video_width(), 960);
        assert_eq!(default_video_height(), 720);
        assert_eq!(default_initial_battery(), 100);
        assert_eq!(default_temperature(), 40.0);
        assert_eq!(default_battery_drain_per_sec(), 0.05);
        assert_eq!(default_telemetry_enabled(), false);
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
    }
}
