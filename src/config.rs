//! Configuration for the poller.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::addressing::{HOLDING_REGISTER_BASE, coil_offset, register_offset};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Complete poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Device endpoint settings
    pub device: DeviceConfig,

    /// Polling settings
    #[serde(default)]
    pub poll: PollConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Endpoint of the single polled Modbus TCP device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device IP address
    pub host: String,

    /// TCP port (default: 502)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Connection timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Polling loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay after a successful poll, in milliseconds (default: 500)
    #[serde(default = "default_success_interval_ms")]
    pub success_interval_ms: u64,

    /// Delay before retrying a failed poll, in milliseconds (default: 1000)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Points to poll continuously
    #[serde(default)]
    pub points: Vec<PointConfig>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            success_interval_ms: default_success_interval_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            points: Vec::new(),
        }
    }
}

fn default_success_interval_ms() -> u64 {
    500
}

fn default_retry_interval_ms() -> u64 {
    1000
}

/// A register, register range, or coil to poll.
///
/// Addresses use PLC documentation numbering: holding registers from 400001,
/// coils from 100001. Addresses below the block base are taken to be
/// zero-based wire offsets already.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PointConfig {
    /// A single holding register
    Register {
        address: u32,
    },
    /// A consecutive range of holding registers, read in one transaction
    Registers {
        address: u32,
        #[serde(default = "default_count")]
        count: u16,
    },
    /// A single coil
    Coil {
        address: u32,
    },
}

fn default_count() -> u16 {
    1
}

impl PointConfig {
    /// Human-readable identification for log lines.
    pub fn describe(&self) -> String {
        match self {
            PointConfig::Register { address } => format!("register {}", address),
            PointConfig::Registers { address, count } => format!(
                "registers {}..={}",
                address,
                *address as u64 + count.saturating_sub(1) as u64
            ),
            PointConfig::Coil { address } => format!("coil {}", address),
        }
    }

    /// Check that the point stays inside one numbering block and that its
    /// translated offsets fit the transport's 16-bit address space.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            PointConfig::Register { address } => check_offset(register_offset(address), self),
            PointConfig::Coil { address } => check_offset(coil_offset(address), self),
            PointConfig::Registers { address, count } => {
                if count == 0 {
                    return Err(ConfigError::Validation(format!(
                        "{}: count must be at least 1",
                        self.describe()
                    )));
                }

                // A range starting below the holding-register base must not
                // cross into it: translation subtracts a constant from the
                // start only, so elements past the boundary would land on
                // the wrong offsets.
                let last = address as u64 + (count as u64 - 1);
                if address < HOLDING_REGISTER_BASE && last >= HOLDING_REGISTER_BASE as u64 {
                    return Err(ConfigError::Validation(format!(
                        "{}: range crosses the {} numbering boundary",
                        self.describe(),
                        HOLDING_REGISTER_BASE
                    )));
                }

                check_offset(register_offset(address), self)?;
                check_offset(register_offset(address) as u64 + (count as u64 - 1), self)
            }
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PollerConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PollerConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.is_empty() {
            return Err(ConfigError::Validation(
                "Device host cannot be empty".to_string(),
            ));
        }

        if self.device.unit_id == 0 {
            return Err(ConfigError::Validation(
                "unit_id must be 1-247".to_string(),
            ));
        }

        for point in &self.poll.points {
            point.validate()?;
        }

        Ok(())
    }
}

fn check_offset(offset: impl Into<u64>, point: &PointConfig) -> Result<(), ConfigError> {
    let offset = offset.into();
    if offset > u16::MAX as u64 {
        return Err(ConfigError::Validation(format!(
            "{}: wire offset {} exceeds the 16-bit address space",
            point.describe(),
            offset
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{
            device: { host: "169.254.234.100" },
            poll: {
                points: [
                    { type: "register", address: 400001 }
                ]
            }
        }"#;

        let config: PollerConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.port, 502);
        assert_eq!(config.device.unit_id, 1);
        assert_eq!(config.device.timeout_ms, 1000);
        assert_eq!(config.poll.success_interval_ms, 500);
        assert_eq!(config.poll.retry_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_point_kinds() {
        let json = r#"{
            device: { host: "10.0.0.5", port: 1502, unit_id: 3 },
            poll: {
                success_interval_ms: 250,
                retry_interval_ms: 2000,
                points: [
                    { type: "register", address: 400010 },
                    { type: "registers", address: 400010, count: 5 },
                    { type: "coil", address: 100001 }
                ]
            }
        }"#;

        let config: PollerConfig = json5::from_str(json).unwrap();
        config.validate().unwrap();

        assert_eq!(config.poll.points.len(), 3);
        assert!(matches!(
            config.poll.points[1],
            PointConfig::Registers {
                address: 400010,
                count: 5
            }
        ));
        assert_eq!(config.poll.success_interval_ms, 250);
    }

    #[test]
    fn test_range_count_defaults_to_one() {
        let json = r#"{ type: "registers", address: 400001 }"#;
        let point: PointConfig = json5::from_str(json).unwrap();
        assert!(matches!(point, PointConfig::Registers { count: 1, .. }));
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let point = PointConfig::Registers {
            address: 400001,
            count: 0,
        };
        assert!(point.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_boundary_crossing_range() {
        // 399999..=400003 straddles the holding-register base; elements past
        // the boundary would translate to the wrong offsets.
        let point = PointConfig::Registers {
            address: 399999,
            count: 5,
        };
        assert!(point.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_offset_overflow() {
        let point = PointConfig::Register { address: 465537 };
        assert!(point.validate().is_err());

        let point = PointConfig::Registers {
            address: 400001,
            count: u16::MAX,
        };
        assert!(point.validate().is_ok());

        // Start offset 2, last offset 65536: one past the wire address space.
        let point = PointConfig::Registers {
            address: 400003,
            count: u16::MAX,
        };
        assert!(point.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_unit_id() {
        let json = r#"{
            device: { host: "10.0.0.5", unit_id: 0 }
        }"#;

        let config: PollerConfig = json5::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_describe_names_logical_addresses() {
        let point = PointConfig::Registers {
            address: 400010,
            count: 5,
        };
        assert_eq!(point.describe(), "registers 400010..=400014");
        assert_eq!(
            PointConfig::Coil { address: 100001 }.describe(),
            "coil 100001"
        );
    }
}
