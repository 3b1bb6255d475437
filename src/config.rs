// Topics, defaults, runtime configuration
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::motor::roboclaw::{DEFAULT_ADDRESS, DEFAULT_BAUDRATE};
use crate::motor::PidConstants;

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "roboclaw/cmd/vel"; // velocity commands
pub const TOPIC_ODOM: &str = "roboclaw/state/odom"; // pose + velocity
pub const TOPIC_HEALTH: &str = "roboclaw/state/health"; // runtime health
pub const TOPIC_DEVICE: &str = "roboclaw/state/device"; // controller diagnostics

/// Serial port used when nothing else is configured
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Runtime configuration. Every missing key takes its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Serial device path
    pub port: String,
    pub baud_rate: u32,
    /// Controller packet serial address
    pub address: u8,
    /// Per-byte read timeout
    pub timeout_seconds: f64,
    /// Control loop frequency
    pub update_rate_hz: u32,
    pub wheel_base_meters: f64,
    pub ticks_per_meter: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Max encoder ticks/s at full speed
    pub qpps: u32,
    pub base_frame_id: String,
    pub odom_frame_id: String,
    /// Stop if no command arrives for this long (0 = never)
    pub command_timeout_seconds: f64,
    pub diagnostics_period_seconds: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            baud_rate: DEFAULT_BAUDRATE,
            address: DEFAULT_ADDRESS,
            timeout_seconds: 1.0,
            update_rate_hz: 30,
            wheel_base_meters: 0.5,
            ticks_per_meter: 100.0,
            kp: 0.1,
            ki: 0.5,
            kd: 0.25,
            qpps: 1000,
            base_frame_id: "base_link".to_string(),
            odom_frame_id: "odom".to_string(),
            command_timeout_seconds: 0.5,
            diagnostics_period_seconds: 1.0,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file; absent keys keep their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("wheel_base_meters", self.wheel_base_meters)?;
        positive("ticks_per_meter", self.ticks_per_meter)?;
        positive("timeout_seconds", self.timeout_seconds)?;
        duration("timeout_seconds", self.timeout_seconds)?;
        positive("diagnostics_period_seconds", self.diagnostics_period_seconds)?;
        duration("diagnostics_period_seconds", self.diagnostics_period_seconds)?;
        if self.update_rate_hz == 0 {
            return Err(ConfigError::Invalid {
                key: "update_rate_hz",
                reason: "must be at least 1".to_string(),
            });
        }
        duration("command_timeout_seconds", self.command_timeout_seconds)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds)
    }

    pub fn loop_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.update_rate_hz as f64)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_seconds > 0.0)
            .then(|| Duration::from_secs_f64(self.command_timeout_seconds))
    }

    pub fn diagnostics_period(&self) -> Duration {
        Duration::from_secs_f64(self.diagnostics_period_seconds)
    }

    pub fn pid(&self) -> PidConstants {
        PidConstants::new(self.kd, self.kp, self.ki, self.qpps)
    }
}

fn positive(key: &'static str, value: f64) -> Result<(), ConfigError> {
    // Written so NaN fails too
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("{} is not a positive number", value),
        })
    }
}

/// Rejects NaN, negatives, infinity and anything too large for a `Duration`
fn duration(key: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| ConfigError::Invalid {
        key,
        reason: format!("{} is not a valid duration: {}", value, e),
    })
}

/// Command line for the runtime binary
#[derive(Debug, Default, Parser)]
#[command(about = "Roboclaw differential drive runtime (zenoh)")]
pub struct Cli {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long)]
    pub port: Option<String>,

    #[arg(long)]
    pub baud_rate: Option<u32>,

    /// Controller address (e.g. 128 for 0x80)
    #[arg(long)]
    pub address: Option<u8>,

    /// Control loop rate in Hz
    #[arg(long)]
    pub rate: Option<u32>,
}

impl Cli {
    /// Resolve the final configuration: defaults, then file, then flags
    pub fn resolve(&self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::from_file(path)?,
            None => RuntimeConfig::default(),
        };

        if let Some(port) = &self.port {
            config.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
        if let Some(address) = self.address {
            config.address = address;
        }
        if let Some(rate) = self.rate {
            config.update_rate_hz = rate;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 38400);
        assert_eq!(config.address, 0x80);
        assert_eq!(config.update_rate_hz, 30);
        assert_eq!(config.qpps, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{ "port": "/dev/ttyUSB1", "ticks_per_meter": 4342.2 }"#)
                .unwrap();
        assert_eq!(config.port, "/dev/ttyUSB1");
        assert_eq!(config.ticks_per_meter, 4342.2);
        assert_eq!(config.wheel_base_meters, 0.5);
        assert_eq!(config.kd, 0.25);
    }

    #[test]
    fn test_validation_rejects_bad_geometry() {
        let config = RuntimeConfig {
            wheel_base_meters: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "wheel_base_meters", .. })
        ));

        let config = RuntimeConfig {
            update_rate_hz: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            ticks_per_meter: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_unrepresentable_durations() {
        let config = RuntimeConfig {
            command_timeout_seconds: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "command_timeout_seconds", .. })
        ));

        let config = RuntimeConfig {
            timeout_seconds: 1e300,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "timeout_seconds", .. })
        ));

        let config = RuntimeConfig {
            diagnostics_period_seconds: 1e300,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RuntimeConfig {
            command_timeout_seconds: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_timeout_zero_disables() {
        let config = RuntimeConfig {
            command_timeout_seconds: 0.0,
            ..Default::default()
        };
        assert_eq!(config.command_timeout(), None);
        assert_eq!(
            RuntimeConfig::default().command_timeout(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_cli_overrides() {
        let args = ["roboclaw-zenoh-runtime", "--port", "/dev/ttyS0", "--rate", "50"];
        let cli = Cli::parse_from(args);
        let config = cli.resolve().unwrap();
        assert_eq!(config.port, "/dev/ttyS0");
        assert_eq!(config.update_rate_hz, 50);
        assert_eq!(config.loop_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_missing_file() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/roboclaw.json")),
            ..Default::default()
        };
        assert!(matches!(cli.resolve(), Err(ConfigError::Read { .. })));
    }
}
