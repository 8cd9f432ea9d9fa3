use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::HwError;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GpioConfig {
    pub sysfs_root: PathBuf,
    pub min_line: u32,
    pub max_line: u32,
    pub export_settle_ms: u64,
    pub watch_poll_timeout_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/gpio"),
            min_line: 2,
            max_line: 28,
            export_settle_ms: 50,
            watch_poll_timeout_ms: 500,
        }
    }
}

impl GpioConfig {
    pub fn export_settle(&self) -> Duration {
        Duration::from_millis(self.export_settle_ms)
    }

    pub fn watch_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.watch_poll_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct I2cConfig {
    pub adapter: u32,
    pub device: Option<PathBuf>,
    pub sda_line: u32,
    pub scl_line: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            adapter: 1,
            device: None,
            sda_line: 2,
            scl_line: 3,
        }
    }
}

impl I2cConfig {
    /// Device node of the adapter, `/dev/i2c-<adapter>` unless overridden.
    pub fn device_path(&self) -> PathBuf {
        self.device
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/dev/i2c-{}", self.adapter)))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct HwConfig {
    pub gpio: GpioConfig,
    pub i2c: I2cConfig,
}

impl HwConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, HwError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| HwError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| HwError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), HwError> {
        if self.gpio.min_line > self.gpio.max_line {
            return Err(HwError::Config(format!(
                "gpio.min_line {} is above gpio.max_line {}",
                self.gpio.min_line, self.gpio.max_line
            )));
        }
        if self.gpio.watch_poll_timeout_ms == 0 {
            return Err(HwError::Config(
                "gpio.watch_poll_timeout_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
