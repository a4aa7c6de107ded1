//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};
use crate::link::LinkTimings;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Period of the link poll loop
    #[serde(default = "default_poll_interval_us")]
    pub poll_interval_us: u64,

    /// Sampling period of the peer's ready line
    #[serde(default = "default_ready_line_poll_us")]
    pub ready_line_poll_us: u64,
}

/// Link timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

/// UDP relay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Directory for the log file; empty logs to stdout only
    #[serde(default)]
    pub dir: String,

    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frame_timeout_ms: default_frame_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            file: default_log_file(),
        }
    }
}

/// Baud rates the co-processor UART supports
pub const VALID_BAUD_RATES: [u32; 6] = [115_200, 230_400, 460_800, 921_600, 2_000_000, 4_000_000];

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 4_000_000 }
fn default_poll_interval_us() -> u64 { 1000 }
fn default_ready_line_poll_us() -> u64 { 100 }

fn default_frame_timeout_ms() -> u64 { 20 }
fn default_ready_timeout_ms() -> u64 { 50 }
fn default_status_interval_ms() -> u64 { 1000 }

fn default_bind_addr() -> String { "0.0.0.0".to_string() }

fn default_log_file() -> String { "wifi-bridge.log".to_string() }

fn invalid(msg: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(msg))
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(format!("{} must be between {} and {}", name, min, max)));
    }
    Ok(())
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
    /// use wifi_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                VALID_BAUD_RATES.map(|b| b.to_string()).join(", ")
            )));
        }

        check_range("poll_interval_us", self.serial.poll_interval_us, 50, 100_000)?;
        check_range("ready_line_poll_us", self.serial.ready_line_poll_us, 10, 10_000)?;

        check_range("frame_timeout_ms", self.link.frame_timeout_ms, 1, 1000)?;
        check_range("ready_timeout_ms", self.link.ready_timeout_ms, 1, 10_000)?;
        check_range("status_interval_ms", self.link.status_interval_ms, 10, 60_000)?;

        self.bind_addr()?;

        if !self.logging.dir.is_empty() && self.logging.file.is_empty() {
            return Err(invalid("logging file cannot be empty when dir is set"));
        }

        Ok(())
    }

    /// Link timing parameters
    pub fn timings(&self) -> LinkTimings {
        LinkTimings {
            frame_timeout: Duration::from_millis(self.link.frame_timeout_ms),
            ready_timeout: Duration::from_millis(self.link.ready_timeout_ms),
            status_interval: Duration::from_millis(self.link.status_interval_ms),
        }
    }

    /// Local address for the UDP relay sockets
    pub fn bind_addr(&self) -> Result<Ipv4Addr> {
        self.network
            .bind_addr
            .parse()
            .map_err(|_| invalid(format!("bind_addr '{}' is not an IPv4 address", self.network.bind_addr)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> Config {
        Config {
            serial: SerialConfig {
                port: default_serial_port(),
                baud_rate: default_baud_rate(),
                poll_interval_us: default_poll_interval_us(),
                ready_line_poll_us: default_ready_line_poll_us(),
            },
            link: LinkConfig::default(),
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    fn load_str(toml_content: &str) -> Result<Config> {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        Config::load(temp_file.path())
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_minimal_config() {
        let config = load_str("[serial]\nport = \"/dev/ttyS1\"\n").unwrap();

        assert_eq!(config.serial.port, "/dev/ttyS1");
        assert_eq!(config.serial.baud_rate, 4_000_000);
        assert_eq!(config.link.frame_timeout_ms, 20);
        assert_eq!(config.network.bind_addr, "0.0.0.0");
        assert!(config.logging.dir.is_empty());
    }

    #[test]
    fn test_load_full_config() {
        let config = load_str(
            r#"
[serial]
port = "/dev/ttyAMA0"
baud_rate = 921600
poll_interval_us = 500

[link]
frame_timeout_ms = 30
status_interval_ms = 2000

[network]
bind_addr = "192.168.4.1"

[logging]
dir = "/var/log/wifi-bridge"
"#,
        )
        .unwrap();

        let timings = config.timings();
        assert_eq!(timings.frame_timeout, Duration::from_millis(30));
        assert_eq!(timings.ready_timeout, Duration::from_millis(50));
        assert_eq!(timings.status_interval, Duration::from_secs(2));
        assert_eq!(config.bind_addr().unwrap(), Ipv4Addr::new(192, 168, 4, 1));
        assert_eq!(config.logging.file, "wifi-bridge.log");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = load_str("[serial\nport = ");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/wifi-bridge.toml");
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 9600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in &VALID_BAUD_RATES {
            let mut config = create_valid_config();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_poll_interval_bounds() {
        let mut config = create_valid_config();
        config.serial.poll_interval_us = 49;
        assert!(config.validate().is_err());

        config.serial.poll_interval_us = 100_001;
        assert!(config.validate().is_err());

        config.serial.poll_interval_us = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ready_line_poll_bounds() {
        let mut config = create_valid_config();
        config.serial.ready_line_poll_us = 9;
        assert!(config.validate().is_err());

        config.serial.ready_line_poll_us = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_timeout_zero() {
        let mut config = create_valid_config();
        config.link.frame_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_timeout_too_high() {
        let mut config = create_valid_config();
        config.link.frame_timeout_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ready_timeout_too_high() {
        let mut config = create_valid_config();
        config.link.ready_timeout_ms = 10_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_interval_too_low() {
        let mut config = create_valid_config();
        config.link.status_interval_ms = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bind_addr() {
        let mut config = create_valid_config();
        config.network.bind_addr = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        config.network.bind_addr = "::1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_dir_without_file() {
        let mut config = create_valid_config();
        config.logging.dir = "./logs".to_string();
        config.logging.file = String::new();
        assert!(config.validate().is_err());

        config.logging.dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyUSB0");
        assert_eq!(default_baud_rate(), 4_000_000);
        assert_eq!(default_poll_interval_us(), 1000);
        assert_eq!(default_ready_line_poll_us(), 100);
        assert_eq!(default_frame_timeout_ms(), 20);
        assert_eq!(default_ready_timeout_ms(), 50);
        assert_eq!(default_status_interval_ms(), 1000);
        assert_eq!(default_bind_addr(), "0.0.0.0");
        assert_eq!(default_log_file(), "wifi-bridge.log");
    }

    #[test]
    fn test_default_timings_match_link() {
        assert_eq!(create_valid_config().timings(), LinkTimings::default());
    }
}
