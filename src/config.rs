//! Daemon configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/color_daq.toml`)
//! 2. environment variables prefixed with `COLOR_DAQ_`, nested keys split on `__`
//!
//! Every section has defaults, so an empty file is a valid (mock-only) configuration.
//!
//! # Example
//! ```no_run
//! use color_daq::config::TrackerConfig;
//!
//! let config = TrackerConfig::load()?;
//! config.validate()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use color_client::{
    ChannelMap, EndpointAddress, PublisherConfig, ReconnectConfig,
};
use color_core::{ColorTransform, LabResponse, SensorSettings, WhitePoint};
use color_driver_mock::MockSensorConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/color_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COLOR_DAQ_";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File or environment could not be parsed
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(Box::new(e))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Sensor driver and settings
    #[serde(default)]
    pub sensor: SensorConfig,
    /// Color conversion
    #[serde(default)]
    pub color: ColorConfig,
    /// Measurement log
    #[serde(default)]
    pub storage: StorageConfig,
    /// Local register server
    #[serde(default)]
    pub server: ServerConfig,
    /// Control endpoints
    #[serde(default)]
    pub publishers: Vec<PublisherEntry>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// JSON lines
    Json,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "color-daq".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Driver name; only `mock` ships with the workspace
    pub driver: String,
    /// Device address for network cameras
    pub address: Option<String>,
    /// Per-frame retrieval timeout in milliseconds
    pub frame_timeout_ms: u64,
    /// One-shot device settings
    pub settings: SensorSettings,
    /// Mock driver parameters
    pub mock: MockSensorConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            driver: "mock".to_string(),
            address: None,
            frame_timeout_ms: 1000,
            settings: SensorSettings::default(),
            mock: MockSensorConfig::default(),
        }
    }
}

impl SensorConfig {
    /// Retrieval timeout
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }
}

/// Color conversion configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Reference white `[x, y, z]`
    pub white_point: WhitePoint,
    /// LAB response variant (`uniform` or `cie1976`)
    pub lab_response: LabResponse,
}

impl ColorConfig {
    /// Transform built from this section
    pub fn transform(&self) -> ColorTransform {
        ColorTransform::new(self.white_point).with_response(self.lab_response)
    }
}

/// Measurement log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Whether samples are appended to the log
    pub enabled: bool,
    /// Log file path
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("log/colors.csv"),
        }
    }
}

/// Local register server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether the server runs
    pub enabled: bool,
    /// Listen address
    pub bind: String,
    /// Refresh period of the served values in milliseconds
    pub period_ms: u64,
    /// Served channels and their target names
    pub channels: ChannelMap,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0:4840".to_string(),
            period_ms: 1000,
            channels: ChannelMap::labels(),
        }
    }
}

/// One control endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherEntry {
    /// Unique publisher name
    pub name: String,
    /// Endpoint address (`tcp://host:port`, `host:port` or `local://name`)
    pub address: String,
    /// Whether this publisher runs
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Publication period in milliseconds
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Reconnect backoff in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Bound on every endpoint operation in milliseconds
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Consecutive failed connects before giving up (0 = never)
    #[serde(default)]
    pub max_attempts: u32,
    /// Published channels
    #[serde(default)]
    pub channels: ChannelMap,
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_period_ms() -> u64 {
    1000
}

fn default_backoff_ms() -> u64 {
    2000
}

fn default_io_timeout_ms() -> u64 {
    5000
}

impl PublisherEntry {
    /// Parsed endpoint address
    pub fn endpoint(&self) -> Result<EndpointAddress, ConfigError> {
        EndpointAddress::parse(&self.address).map_err(|e| {
            ConfigError::Invalid(format!("publisher '{}': {}", self.name, e))
        })
    }

    /// Runtime publisher configuration
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            name: self.name.clone(),
            period: Duration::from_millis(self.period_ms),
            reconnect: ReconnectConfig {
                backoff: Duration::from_millis(self.backoff_ms),
                max_attempts: self.max_attempts,
            },
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            channels: self.channels.clone(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file, e.g.
    /// `COLOR_DAQ_APPLICATION__LOG_LEVEL=debug`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Parse configuration from a TOML string (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Ok(Figment::from(Toml::string(toml)).extract()?)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.sensor.driver != "mock" {
            return Err(ConfigError::Invalid(format!(
                "Unknown sensor driver '{}'. Available: mock",
                self.sensor.driver
            )));
        }
        if self.sensor.frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "sensor.frame_timeout_ms must be non-zero".to_string(),
            ));
        }
        self.sensor
            .settings
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.storage.enabled && self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.path must not be empty".to_string(),
            ));
        }

        if self.server.enabled {
            if self.server.period_ms == 0 {
                return Err(ConfigError::Invalid(
                    "server.period_ms must be non-zero".to_string(),
                ));
            }
            self.server
                .channels
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("server: {}", e)))?;
        }

        let mut names = HashSet::new();
        for publisher in &self.publishers {
            if !names.insert(publisher.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate publisher name: {}",
                    publisher.name
                )));
            }
            publisher.endpoint()?;
            publisher
                .publisher_config()
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("publisher '{}': {}", publisher.name, e)))?;
        }

        Ok(())
    }

    /// Get all enabled publishers
    pub fn enabled_publishers(&self) -> Vec<&PublisherEntry> {
        self.publishers.iter().filter(|p| p.enabled).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_core::Channel;
    use serial_test::serial;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [application]
        name = "line-3"
        log_level = "debug"
        log_format = "json"

        [sensor]
        frame_timeout_ms = 500
        [sensor.settings]
        roi = { offset_x = 544, offset_y = 340, width = 848, height = 300 }
        exposure_us = 16000.0
        gain = 2.7
        white_balance = [1.0, 0.545, 1.257]
        [sensor.mock]
        base_rgb = [100.0, 80.0, 60.0]

        [color]
        white_point = [0.938, 0.981, 1.070]
        lab_response = "cie1976"

        [storage]
        path = "log/line3.csv"

        [[publishers]]
        name = "plc"
        address = "10.129.4.30"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = TrackerConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.application.log_format, LogFormat::Json);
        assert_eq!(config.sensor.frame_timeout(), Duration::from_millis(500));
        assert_eq!(config.sensor.settings.roi.map(|r| r.width), Some(848));
        assert_eq!(config.color.lab_response, LabResponse::Cie1976);
        assert_eq!(config.color.white_point.y(), 0.981);

        let plc = &config.publishers[0];
        assert_eq!(plc.period_ms, 1000);
        assert_eq!(plc.backoff_ms, 2000);
        assert_eq!(plc.channels, ChannelMap::plc_default());
        assert_eq!(
            plc.endpoint().unwrap().socket_addr().as_deref(),
            Some("10.129.4.30:4840")
        );
        let runtime = plc.publisher_config();
        assert_eq!(runtime.reconnect.backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert!(config.validate().is_ok());
        assert!(config.storage.enabled);
        assert!(!config.server.enabled);
        assert!(config.publishers.is_empty());
        assert_eq!(config.color.lab_response, LabResponse::Uniform);
        assert_eq!(config.color.transform(), ColorTransform::default());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = TrackerConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_white_point_must_be_positive() {
        let result = TrackerConfig::from_toml_str("[color]\nwhite_point = [0.95, 0.0, 1.08]");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_publisher_names() {
        let config = TrackerConfig::from_toml_str(
            r#"
            [[publishers]]
            name = "plc"
            address = "10.0.0.1"
            [[publishers]]
            name = "plc"
            address = "10.0.0.2"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate publisher name"));
    }

    #[test]
    fn test_bad_address_and_missing_channel() {
        let bad_address = TrackerConfig::from_toml_str(
            "[[publishers]]\nname = \"plc\"\naddress = \"http://10.0.0.1\"",
        )
        .unwrap();
        assert!(bad_address.validate().is_err());

        let missing_channel = TrackerConfig::from_toml_str(
            r#"
            [[publishers]]
            name = "plc"
            address = "10.0.0.1"
            channels = [ { channel = "R", target = "ns=4;i=116" } ]
            "#,
        )
        .unwrap();
        let err = missing_channel.validate().unwrap_err();
        assert!(err.to_string().contains("missing required channel"));
    }

    #[test]
    fn test_server_defaults_to_all_channels() {
        let config = TrackerConfig::from_toml_str("[server]\nenabled = true").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.channels.entries().len(), 9);
        assert_eq!(config.server.channels.entries()[8].channel, Channel::BStar);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", SAMPLE).unwrap();

        std::env::set_var("COLOR_DAQ_APPLICATION__LOG_LEVEL", "warn");
        std::env::set_var("COLOR_DAQ_STORAGE__ENABLED", "false");
        let config = TrackerConfig::load_from(file.path());
        std::env::remove_var("COLOR_DAQ_APPLICATION__LOG_LEVEL");
        std::env::remove_var("COLOR_DAQ_STORAGE__ENABLED");

        let config = config.unwrap();
        assert_eq!(config.application.log_level, "warn");
        assert!(!config.storage.enabled);
        assert_eq!(config.application.name, "line-3");
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = TrackerConfig::load_from("does/not/exist.toml").unwrap();
        assert_eq!(config.application.name, "color-daq");
    }
}
