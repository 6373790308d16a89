use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gpumem::sim::config::SystemConfig;
use gpumem::sim::top::System;
use log::LevelFilter;
use toml::Table;

#[derive(Parser)]
#[command(version, about)]
struct GpumemArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override number of reads the agent issues")]
    num_reads: Option<usize>,
    #[arg(long, help = "Override number of writes the agent issues")]
    num_writes: Option<usize>,
    #[arg(long, help = "Override random seed (0 picks one)")]
    seed: Option<u64>,
    #[arg(long, help = "Connect the agent straight to the cache")]
    no_rob: bool,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug, 3:trace)")]
    log: Option<u64>,
}

fn level_filter(log_level: u64) -> LevelFilter {
    match log_level {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

pub fn main() -> anyhow::Result<()> {
    let argv = GpumemArgs::parse();
    let config = fs::read_to_string(&argv.config_path)
        .with_context(|| format!("failed to read {}", argv.config_path.display()))?;
    let config_table: Table = toml::from_str(&config).context("cannot parse config toml")?;
    let mut config = SystemConfig::from_table(&config_table);

    // override toml configs with argv
    config.sim.log_level = argv.log.unwrap_or(config.sim.log_level);
    config.sim.seed = argv.seed.unwrap_or(config.sim.seed);
    config.traffic.num_reads = argv.num_reads.unwrap_or(config.traffic.num_reads);
    config.traffic.num_writes = argv.num_writes.unwrap_or(config.traffic.num_writes);
    config.traffic.use_rob &= !argv.no_rob;

    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(level_filter(config.sim.log_level));
    }
    logger.init();

    let mut system = System::build(&config);
    let summary = system.run()?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &config.sim.stats_json {
        Some(path) => fs::write(path, &json)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
