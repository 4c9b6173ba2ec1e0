use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub console: ConsoleConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConsoleConfig {
    Serial {
        /// Serial device, e.g. /dev/ttyUSB0 or COM3
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Mock {
        /// Archive records the simulated console starts with
        #[serde(default)]
        archive_records: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// LOOP/LOOP2 pairs read per pass
    pub current_weather_cycles: usize,
    /// Deadline for a single framed read, in milliseconds
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    19200
}

impl DriverConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            current_weather_cycles: 12,
            read_timeout_ms: 5000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            console: ConsoleConfig::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: default_baud_rate(),
            },
            driver: DriverConfig::default(),
        }
    }
}
