use std::path::PathBuf;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

use crate::cache::CacheConfig;
use crate::mem::IdealMemConfig;
use crate::rob::RobConfig;
use crate::traffic::TrafficConfig;

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> Self {
        match section {
            Some(value) => value.clone().try_into().expect("cannot deserialize config"),
            None => {
                warn!("config section not found");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub max_cycles: u64,
    /// 0: none, 1: info, 2: debug
    pub log_level: u64,
    /// 0 picks a fresh seed for every run.
    pub seed: u64,
    pub stats_json: Option<PathBuf>,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100_000_000,
            log_level: 0,
            seed: 0,
            stats_json: None,
        }
    }
}

/// Every section of a simulation config file.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    pub sim: SimConfig,
    pub traffic: TrafficConfig,
    pub rob: RobConfig,
    pub cache: CacheConfig,
    pub dram: IdealMemConfig,
}

impl SystemConfig {
    pub fn from_table(table: &Table) -> Self {
        Self {
            sim: SimConfig::from_section(table.get("sim")),
            traffic: TrafficConfig::from_section(table.get("traffic")),
            rob: RobConfig::from_section(table.get("rob")),
            cache: CacheConfig::from_section(table.get("cache")),
            dram: IdealMemConfig::from_section(table.get("dram")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_read_independently() {
        let table: Table = toml::from_str(
            r#"
            [sim]
            seed = 42
            stats_json = "out.json"

            [cache]
            log2_block_size = 7
            bank_latency = 3

            [dram]
            latency = 50
            num_channels = 4
            "#,
        )
        .unwrap();
        let config = SystemConfig::from_table(&table);
        assert_eq!(config.sim.seed, 42);
        assert_eq!(config.sim.stats_json, Some(PathBuf::from("out.json")));
        assert_eq!(config.cache.log2_block_size, 7);
        assert_eq!(config.cache.bank_latency, 3);
        assert_eq!(config.cache.way_associativity, 2);
        assert_eq!(config.dram.latency, 50);
        assert_eq!(config.dram.num_channels, 4);
        assert_eq!(config.dram.interleaving_size, 4096);
        assert_eq!(config.rob.buffer_size, RobConfig::default().buffer_size);
        assert!(config.traffic.use_rob);
    }

    #[test]
    #[should_panic(expected = "cannot deserialize config")]
    fn wrong_types_are_fatal() {
        let table: Table = toml::from_str("[cache]\nnum_banks = \"two\"").unwrap();
        SystemConfig::from_table(&table);
    }
}
