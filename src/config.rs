//! Configuration for the Prasaran daemon
//!
//! Loads configuration from a TOML file. Every section is optional and
//! falls back to the defaults below, so an empty file is a valid config.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub ingress: IngressConfig,
    pub channels: ChannelConfig,
    pub viewer: ViewerConfig,
    pub attitude: AttitudeConfig,
    pub radiation: RadiationConfig,
    pub sensors: SensorConfig,
    pub logging: LoggingConfig,
}

/// Datagram ingress (the network-delivered binary feed)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngressConfig {
    /// UDP port to listen on (all interfaces)
    pub port: u16,
    /// Receive buffer size in bytes, including the 4-byte header
    pub payload_size: usize,
    /// Code that ends the listener session
    pub exit_code: i16,
    /// Code routed to the text report
    pub post_code: i16,
    /// Code routed to the `data` channel
    pub data_code: i16,
    /// Appended after every POST line
    pub line_terminator: String,
    /// Text the report is reset to when a session starts
    pub report_banner: String,
    /// Start listening at boot instead of on the first `data` viewer
    pub autostart: bool,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            port: 1701,
            payload_size: 1024,
            exit_code: -1,
            post_code: 0,
            data_code: 1,
            line_terminator: "<br>".to_string(),
            report_banner: "-----Begin POST Results-----<br>".to_string(),
            autostart: false,
        }
    }
}

/// Broadcast channel tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Messages held per channel before the oldest is dropped
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { queue_capacity: 3 }
    }
}

/// Viewer-facing TCP server
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// TCP bind address for viewer connections
    ///
    /// Examples:
    /// - `0.0.0.0:1702` - Bind to all interfaces on port 1702
    /// - `127.0.0.1:1702` - Localhost only
    pub bind_address: String,
    /// Socket write timeout; a viewer slower than this is dropped
    pub write_timeout_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1702".to_string(),
            write_timeout_ms: 500,
        }
    }
}

/// Attitude (MPU6050-class IMU) fusion
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AttitudeConfig {
    /// Weight of the accelerometer estimate in the blend (0.0 to 1.0)
    pub accel_weight: f64,
    /// Nominal sample rate of the source (Hz)
    pub sample_rate_hz: f64,
}

impl Default for AttitudeConfig {
    fn default() -> Self {
        Self {
            accel_weight: 0.9836,
            sample_rate_hz: 30.0,
        }
    }
}

/// Radiation (Geiger counter) tally
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RadiationConfig {
    /// Tally interval in milliseconds
    pub interval_ms: u64,
    /// Directory for the raw pulse timestamp log; empty means home directory
    pub save_directory: String,
}

impl Default for RadiationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            save_directory: String::new(),
        }
    }
}

/// Where sensor samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorSourceKind {
    /// Simulated IMU and Geiger counter (requires the `mock` feature)
    #[default]
    Mock,
    /// No local sensors; only the datagram feed is relayed
    None,
}

/// Sensor source selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    pub source: SensorSourceKind,
    /// Seed for the simulated sources (0 = random each run)
    pub random_seed: u64,
    /// Mean simulated Geiger pulse rate (pulses per second)
    pub mock_pulse_rate: f64,
    /// Peak simulated platform sway (degrees)
    pub mock_sway_deg: f64,
    /// Simulated sensor noise standard deviation (raw LSB)
    pub mock_noise_lsb: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            source: SensorSourceKind::Mock,
            random_seed: 0,
            mock_pulse_rate: 0.5,
            mock_sway_deg: 3.0,
            mock_noise_lsb: 40.0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use prasaran::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("prasaran.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        let ingress = &self.ingress;
        if ingress.payload_size < crate::streaming::wire::HEADER_LEN {
            return Err(Error::InvalidConfig(format!(
                "payload_size {} is smaller than the datagram header",
                ingress.payload_size
            )));
        }
        if ingress.payload_size > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "payload_size {} exceeds the largest UDP datagram",
                ingress.payload_size
            )));
        }
        if ingress.data_code == ingress.post_code
            || ingress.data_code == ingress.exit_code
            || ingress.post_code == ingress.exit_code
        {
            return Err(Error::InvalidConfig(format!(
                "routing codes must be distinct (data={}, post={}, exit={})",
                ingress.data_code, ingress.post_code, ingress.exit_code
            )));
        }
        if self.channels.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.attitude.accel_weight) {
            return Err(Error::InvalidConfig(format!(
                "accel_weight {} is outside [0, 1]",
                self.attitude.accel_weight
            )));
        }
        if self.radiation.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "radiation interval_ms must be positive".to_string(),
            ));
        }
        if !(self.attitude.sample_rate_hz > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "attitude sample_rate_hz {} must be positive",
                self.attitude.sample_rate_hz
            )));
        }
        if !(self.sensors.mock_pulse_rate >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "mock_pulse_rate {} must not be negative",
                self.sensors.mock_pulse_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ingress.port, 1701);
        assert_eq!(config.ingress.payload_size, 1024);
        assert_eq!(config.ingress.exit_code, -1);
        assert_eq!(config.ingress.post_code, 0);
        assert_eq!(config.ingress.data_code, 1);
        assert_eq!(config.channels.queue_capacity, 3);
        assert_eq!(config.viewer.bind_address, "0.0.0.0:1702");
        assert_eq!(config.sensors.source, SensorSourceKind::Mock);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[ingress]"));
        assert!(toml_string.contains("[channels]"));
        assert!(toml_string.contains("[viewer]"));
        assert!(toml_string.contains("[logging]"));

        assert!(toml_string.contains("port = 1701"));
        assert!(toml_string.contains("line_terminator = \"<br>\""));
        assert!(toml_string.contains("source = \"mock\""));
    }

    #[test]
    fn test_toml_deserialization_partial() {
        let toml_content = r#"
[ingress]
port = 9000
data_code = 7

[sensors]
source = "none"

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.ingress.port, 9000);
        assert_eq!(config.ingress.data_code, 7);
        // Unspecified fields keep their defaults
        assert_eq!(config.ingress.payload_size, 1024);
        assert_eq!(config.channels.queue_capacity, 3);
        assert_eq!(config.sensors.source, SensorSourceKind::None);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prasaran.toml");

        let mut config = AppConfig::default();
        config.ingress.port = 4242;
        config.radiation.save_directory = "/tmp/rad".to_string();
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.ingress.port, 4242);
        assert_eq!(loaded.radiation.save_directory, "/tmp/rad");
    }

    #[test]
    fn test_validate_rejects_duplicate_codes() {
        let mut config = AppConfig::default();
        config.ingress.post_code = config.ingress.data_code;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_tiny_payload() {
        let mut config = AppConfig::default();
        config.ingress.payload_size = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.channels.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_sensor_values() {
        let mut config = AppConfig::default();
        config.attitude.accel_weight = 1.2;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.attitude.sample_rate_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.sensors.mock_pulse_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/prasaran.toml");
        let config = AppConfig::from_file(path).unwrap();
        let defaults = AppConfig::default();
        assert_eq!(toml::to_string(&config).unwrap(), toml::to_string(&defaults).unwrap());
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[ingress\nport = ").unwrap();
        assert!(matches!(
            AppConfig::from_file(&path),
            Err(Error::ConfigParse(_))
        ));
    }
}
