use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{types::StepIdentifier, Error};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: String,
    pub name: String,
    pub rpc_url: String,
    pub bridge_address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayerConfig {
    pub name: String,
    /// This relayer's address, as known by the other relayers.
    pub address: String,
    /// Addresses of every relayer taking part in the bridge, this one included.
    pub relayers: Vec<String>,
    pub quorum: u64,
    pub leader_interval_secs: u64,
    pub step_interval_millis: u64,
    pub step_durations_millis: HashMap<StepIdentifier, u64>,
    #[serde(default)]
    pub status_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub source: ChainConfig,
    pub destination: ChainConfig,
    pub relayer: RelayerConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, Error> {
        let config_str = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json(&config_str)
    }

    pub fn from_json(config_str: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(config_str)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        for chain in [&self.source, &self.destination] {
            if chain.id.is_empty() {
                return Err(Error::Config(format!("Empty chain ID for chain {}", chain.name)));
            }
            if chain.rpc_url.is_empty() {
                return Err(Error::Config(format!("Empty RPC URL for chain {}", chain.id)));
            }
        }
        if self.source.id == self.destination.id {
            return Err(Error::Config(format!(
                "Source and destination chains must differ: {}",
                self.source.id
            )));
        }

        let relayer = &self.relayer;
        if relayer.name.is_empty() {
            return Err(Error::Config("Relayer name must not be empty".to_string()));
        }
        if !relayer.relayers.contains(&relayer.address) {
            return Err(Error::Config(format!(
                "Relayer address {} is not part of the relayers list",
                relayer.address
            )));
        }
        if relayer.quorum == 0 || relayer.quorum > relayer.relayers.len() as u64 {
            return Err(Error::Config(format!(
                "Invalid quorum {} for {} relayers",
                relayer.quorum,
                relayer.relayers.len()
            )));
        }
        if relayer.leader_interval_secs == 0 {
            return Err(Error::Config("Leader interval must be greater than 0".to_string()));
        }
        if relayer.step_interval_millis == 0 {
            return Err(Error::Config("Step interval must be greater than 0".to_string()));
        }
        for step in StepIdentifier::ALL {
            if !relayer.step_durations_millis.contains_key(&step) {
                return Err(Error::Config(format!("Missing duration for step {}", step)));
            }
        }

        Ok(())
    }

    pub fn durations_map(&self) -> HashMap<StepIdentifier, Duration> {
        self.relayer
            .step_durations_millis
            .iter()
            .map(|(step, millis)| (*step, Duration::from_millis(*millis)))
            .collect()
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.relayer.step_interval_millis)
    }

    pub fn leader_interval(&self) -> Duration {
        Duration::from_secs(self.relayer.leader_interval_secs)
    }
}
