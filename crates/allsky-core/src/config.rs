//! Camera configuration.

use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::protocol::{
    ChecksumPolicy, DEFAULT_BAUD_RATE, DEFAULT_DEVICE, SHUTTER_SETTLE_MS, SUPPORTED_BAUD_RATES,
};
use crate::transport::SerialTransport;

/// Configuration for a camera link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Serial device path.
    pub device: String,
    /// Link speed.
    pub baud_rate: u32,
    /// Transport read timeout; also the abort poll period while exposing.
    pub poll_interval_ms: u64,
    /// Fail an exchange after this long without data. Zero waits forever.
    pub idle_timeout_ms: u64,
    /// Handling of checksum mismatches.
    pub checksum_policy: ChecksumPolicy,
    /// Delay between a shutter move and de-energizing the motor.
    pub shutter_settle_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval_ms: 50,
            idle_timeout_ms: 5000,
            checksum_policy: ChecksumPolicy::Lenient,
            shutter_settle_ms: SHUTTER_SETTLE_MS,
        }
    }
}

impl CameraConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CameraConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            bail!(
                "Unsupported baud rate {}, expected one of {:?}",
                self.baud_rate,
                SUPPORTED_BAUD_RATES
            );
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    pub fn shutter_settle(&self) -> Duration {
        Duration::from_millis(self.shutter_settle_ms)
    }

    /// Serial transport for this configuration (not opened yet).
    pub fn serial_transport(&self) -> SerialTransport {
        SerialTransport::new(&self.device, self.baud_rate, self.poll_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CameraConfig::default();
        assert_eq!(config.device, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.shutter_settle(), Duration::from_millis(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CameraConfig = toml::from_str(
            r#"
            device = "/dev/ttyS1"
            checksum_policy = "strict"
            "#,
        )
        .unwrap();
        assert_eq!(config.device, "/dev/ttyS1");
        assert_eq!(config.checksum_policy, ChecksumPolicy::Strict);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("allsky-config-{}.toml", std::process::id()));
        let config = CameraConfig {
            baud_rate: 460_800,
            idle_timeout_ms: 0,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = CameraConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
        assert_eq!(loaded.idle_timeout(), None);
    }

    #[test]
    fn test_rejects_unsupported_baud_rate() {
        let config = CameraConfig {
            baud_rate: 9600,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
