//! # engine_app
//!
//! Runs the demo world at a fixed tick rate.
//!
//! ## Configuration
//!
//! Tick settings come from `--config <file.json>` when given, then any
//! `--tick-rate`, `--max-ticks` or `--group` flag overrides the file. Log
//! verbosity follows `RUST_LOG` (default `engine_app=info`).

mod demo;
mod tick;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tick::{TickConfig, TickLoop};

#[derive(Debug, Parser)]
#[command(name = "engine_app", about = "Runs the ECS demo world at a fixed tick rate")]
struct Cli {
    /// Target ticks per second
    #[arg(long)]
    tick_rate: Option<f64>,

    /// Stop after this many ticks (0 runs forever)
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Run only this system group each tick
    #[arg(long)]
    group: Option<String>,

    /// Number of walkers to spawn
    #[arg(long, default_value_t = 8)]
    entities: usize,

    /// JSON tick config file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn tick_config(&self) -> Result<TickConfig> {
        let mut config = match &self.config {
            Some(path) => TickConfig::from_json_file(path)?,
            None => TickConfig::default(),
        };
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(max_ticks) = self.max_ticks {
            config.max_ticks = max_ticks;
        }
        if let Some(group) = &self.group {
            config.group = Some(group.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("engine_app=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut tick_loop = TickLoop::new(cli.tick_config()?);
    info!(config = ?tick_loop.config(), entities = cli.entities, "engine starting");

    demo::register(tick_loop.world_mut())?;
    demo::populate(tick_loop.world_mut(), cli.entities)?;

    let outcome = tick_loop.run();
    demo::summarize(tick_loop.world());
    outcome?;

    info!(ticks = tick_loop.tick_id(), "engine shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::parse_from(["engine_app", "--tick-rate", "30", "--group", "model"]);
        let config = cli.tick_config().unwrap();
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.max_ticks, 0);
        assert_eq!(config.group.as_deref(), Some("model"));
        assert_eq!(cli.entities, 8);
    }

    #[test]
    fn test_cli_rejects_zero_tick_rate() {
        let cli = Cli::parse_from(["engine_app", "--tick-rate", "0"]);
        assert!(cli.tick_config().is_err());
    }

    #[test]
    fn test_demo_runs_under_tick_loop() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 25,
            group: None,
        };
        let mut tick_loop = TickLoop::new(config);
        demo::register(tick_loop.world_mut()).unwrap();
        demo::populate(tick_loop.world_mut(), 4).unwrap();
        tick_loop.run().unwrap();
        assert_eq!(tick_loop.tick_id(), 25);
        assert_eq!(tick_loop.world().entity_count(), 4);
    }
}
