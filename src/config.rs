use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{fs::File, path::Path, time::Duration};
use yosemitech_lib::{model::SensorModel, protocol::Address};

/// One sensor on the bus.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    pub name: String,
    pub model: SensorModel,
    #[serde(default)]
    pub address: Address,
}

/// Everything the daemon polls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DaemonConfig {
    /// Time between two rounds over all sensors.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Time the sensors get after the start command before the first read.
    #[serde(default = "default_warm_up", with = "humantime_serde")]
    pub warm_up: Duration,
    pub sensors: Vec<SensorConfig>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_warm_up() -> Duration {
    Duration::from_secs(2)
}

impl DaemonConfig {
    pub const DEFAULT_CONFIG_FILE: &'static str = "yosemitech.yml";

    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading config file from {path:?}");
        let file = File::open(path).with_context(|| format!("Cannot open {path:?}"))?;
        let config: Self = serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.sensors.is_empty() {
            bail!("No sensors configured");
        }
        for (i, sensor) in self.sensors.iter().enumerate() {
            if let Some(other) = self.sensors[..i]
                .iter()
                .find(|other| other.address == sensor.address)
            {
                bail!(
                    "Sensors '{}' and '{}' share address {}",
                    other.name,
                    sensor.name,
                    sensor.address
                );
            }
        }
        Ok(())
    }
}
