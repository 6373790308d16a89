use log::info;
use serde::Serialize;

use crate::base::engine::{Engine, TickingComponent};
use crate::base::msg::IdGenerator;
use crate::base::port::Connection;
use crate::cache::{CacheBuilder, CacheStats, WriteAroundCache};
use crate::mem::{IdealMemController, InterleavedLowModuleFinder, SingleLowModuleFinder};
use crate::rob::{ReorderBuffer, RobBuilder, RobStats};
use crate::sim::config::SystemConfig;
use crate::timeq::Cycle;
use crate::traffic::{AgentStats, MemAccessAgent};

/// Everything one acceptance run reports.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub cycles: Cycle,
    pub seed: u64,
    pub agent: AgentStats,
    pub rob: Option<RobStats>,
    pub cache: CacheStats,
}

/// Agent, optional reorder buffer, write-around cache and DRAM channels, wired in that order on
/// one connection.
pub struct System {
    pub agent: MemAccessAgent,
    pub rob: Option<ReorderBuffer>,
    pub cache: WriteAroundCache,
    pub drams: Vec<IdealMemController>,
    engine: Engine,
    max_cycles: Cycle,
    seed: u64,
}

impl System {
    pub fn build(config: &SystemConfig) -> Self {
        let conn = Connection::new();
        let ids = IdGenerator::new();
        let seed = match config.sim.seed {
            0 => rand::random(),
            seed => seed,
        };

        let num_channels = config.dram.num_channels;
        assert!(num_channels > 0, "num_channels must be > 0");
        let drams: Vec<_> = (0..num_channels)
            .map(|i| {
                IdealMemController::new(format!("DRAM[{i}]"), &conn, ids.clone(), config.dram)
            })
            .collect();
        let builder = CacheBuilder::new("Cache", ids.clone()).with_config(config.cache);
        let builder = match drams.as_slice() {
            [dram] => {
                builder.with_low_module_finder(SingleLowModuleFinder::new(dram.top_port.id()))
            }
            _ => {
                // a line fetch and the writes to it must land on one channel
                assert_eq!(
                    config.dram.interleaving_size % config.cache.block_size(),
                    0,
                    "interleaving_size must be a multiple of the cache block size"
                );
                let low_modules = drams.iter().map(|dram| dram.top_port.id()).collect();
                builder.with_low_module_finder(InterleavedLowModuleFinder::new(
                    config.dram.interleaving_size,
                    low_modules,
                ))
            }
        };
        let cache = builder.build(&conn);
        let rob = config.traffic.use_rob.then(|| {
            RobBuilder::new("ROB", ids.clone())
                .with_config(config.rob)
                .with_bottom_unit(cache.top_port.id())
                .build(&conn)
        });
        let agent_target = match &rob {
            Some(rob) => rob.top_port.id(),
            None => cache.top_port.id(),
        };
        let agent = MemAccessAgent::new("Agent", &conn, ids, &config.traffic, seed)
            .with_low_module(agent_target);

        info!(
            "built system: {} ports, {num_channels} dram channels, rob {}, seed {seed}",
            conn.num_ports(),
            if rob.is_some() { "enabled" } else { "disabled" }
        );
        Self {
            agent,
            rob,
            cache,
            drams,
            engine: Engine::new(),
            max_cycles: config.sim.max_cycles,
            seed,
        }
    }

    /// Runs until nothing moves, then fails if the agent is still owed a response.
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        let cycles = {
            let mut comps: Vec<&mut dyn TickingComponent> = vec![&mut self.agent];
            if let Some(rob) = self.rob.as_mut() {
                comps.push(rob);
            }
            comps.push(&mut self.cache);
            for dram in self.drams.iter_mut() {
                comps.push(dram);
            }
            self.engine.run(&mut comps, self.max_cycles)?
        };
        self.agent.ensure_all_returned()?;
        info!("all requests returned after {cycles} cycles");

        Ok(RunSummary {
            cycles,
            seed: self.seed,
            agent: self.agent.stats().clone(),
            rob: self.rob.as_ref().map(|rob| *rob.stats()),
            cache: *self.cache.stats(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::mem::IdealMemConfig;
    use crate::traffic::TrafficConfig;

    /// The configuration the write-around acceptance run uses, scaled down.
    fn acceptance_config(use_rob: bool, seed: u64) -> SystemConfig {
        let mut config = SystemConfig::default();
        config.sim.seed = seed;
        config.sim.max_cycles = 5_000_000;
        config.traffic = TrafficConfig {
            num_reads: 2000,
            num_writes: 2000,
            max_address: 1 << 14,
            use_rob,
            port_buffer_size: 16,
        };
        config.cache = CacheConfig {
            log2_block_size: 6,
            total_byte_size: 4096,
            way_associativity: 8,
            num_mshr_entry: 4,
            num_banks: 1,
            bank_latency: 20,
            ..CacheConfig::default()
        };
        config.dram = IdealMemConfig {
            capacity: 4 << 30,
            ..IdealMemConfig::default()
        };
        config
    }

    #[test]
    fn random_traffic_through_rob_and_cache() {
        let mut system = System::build(&acceptance_config(true, 1));
        let summary = system.run().unwrap();
        assert_eq!(summary.agent.reads_checked(), 2000);
        assert_eq!(summary.agent.writes_done(), 2000);
        assert!(summary.rob.is_some());
        assert!(summary.cache.read_hits() + summary.cache.read_misses() > 0);
        assert_eq!(system.cache.num_live_transactions(), 0);
        assert_eq!(system.rob.as_ref().unwrap().num_transactions(), 0);
    }

    #[test]
    fn random_traffic_straight_into_cache() {
        let mut system = System::build(&acceptance_config(false, 2));
        let summary = system.run().unwrap();
        assert!(summary.rob.is_none());
        assert_eq!(summary.agent.reads_checked(), 2000);
        assert_eq!(summary.cache.write_requests(), 2000);
    }

    #[test]
    fn small_address_range_stresses_conflicts() {
        let mut config = acceptance_config(true, 3);
        config.traffic.max_address = 256;
        config.cache.num_banks = 2;
        config.cache.bank_latency = 1;
        let mut system = System::build(&config);
        system.run().unwrap();
        assert!(system.agent.is_finished());
    }

    #[test]
    fn random_traffic_over_interleaved_channels() {
        let mut config = acceptance_config(true, 5);
        config.dram.num_channels = 2;
        config.dram.interleaving_size = 64;
        let mut system = System::build(&config);
        let summary = system.run().unwrap();
        assert_eq!(summary.agent.reads_checked(), 2000);
        assert_eq!(summary.agent.writes_done(), 2000);
        assert_eq!(system.drams.len(), 2);
    }

    #[test]
    #[should_panic(expected = "multiple of the cache block size")]
    fn interleaving_must_cover_whole_lines() {
        let mut config = acceptance_config(true, 6);
        config.dram.num_channels = 2;
        config.dram.interleaving_size = 32;
        System::build(&config);
    }

    #[test]
    fn cycle_budget_is_reported() {
        let mut config = acceptance_config(true, 4);
        config.sim.max_cycles = 10;
        let err = System::build(&config).run().unwrap_err();
        assert!(err.to_string().contains("still busy"));
    }
}
