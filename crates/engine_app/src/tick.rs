//! Fixed-rate tick loop.
//!
//! Each tick runs the world's schedule (or a single group of it) once, passing
//! the fixed timestep as the global argument, then sleeps away whatever is
//! left of the tick's budget.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use engine_ecs::{EcsError, World};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Configuration for the tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Target ticks per second.
    pub tick_rate: f64,
    /// Maximum number of ticks to run (0 = unlimited).
    pub max_ticks: u64,
    /// Run only this group each tick instead of the full schedule.
    pub group: Option<String>,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60.0,
            max_ticks: 0,
            group: None,
        }
    }
}

impl TickConfig {
    /// Load a config from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// The file cannot be read or is not a valid config.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading tick config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing tick config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// A tick rate that is not a positive finite number.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.tick_rate.is_finite() && self.tick_rate > 0.0,
            "tick_rate must be positive, got {}",
            self.tick_rate
        );
        Ok(())
    }

    /// Length of one tick.
    #[must_use]
    pub fn budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }
}

/// Drives a [`World<f64>`] at a fixed rate.
#[derive(Debug)]
pub struct TickLoop {
    tick_id: u64,
    config: TickConfig,
    world: World<f64>,
}

impl TickLoop {
    #[must_use]
    pub fn new(config: TickConfig) -> Self {
        Self {
            tick_id: 0,
            config,
            world: World::new(),
        }
    }

    /// Number of ticks run so far.
    #[must_use]
    pub fn tick_id(&self) -> u64 {
        self.tick_id
    }

    #[must_use]
    pub fn config(&self) -> &TickConfig {
        &self.config
    }

    #[must_use]
    pub fn world(&self) -> &World<f64> {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World<f64> {
        &mut self.world
    }

    /// Run one tick with timestep `dt` (seconds).
    ///
    /// # Errors
    ///
    /// The first failing system hook. The tick still counts.
    pub fn tick(&mut self, dt: f64) -> Result<(), EcsError> {
        self.tick_id += 1;
        debug!(tick_id = self.tick_id, dt, group = ?self.config.group, "tick start");
        match &self.config.group {
            Some(group) => self.world.run_group(group, &dt),
            None => self.world.run(&dt),
        }
    }

    /// Tick at the configured rate until `max_ticks` is reached (forever if
    /// it is 0).
    ///
    /// # Errors
    ///
    /// The first failing tick stops the loop.
    pub fn run(&mut self) -> Result<(), EcsError> {
        let budget = self.config.budget();
        let dt = budget.as_secs_f64();
        let mut tick_count = 0u64;

        info!(
            tick_rate = self.config.tick_rate,
            max_ticks = self.config.max_ticks,
            group = ?self.config.group,
            "starting tick loop"
        );

        loop {
            let start = Instant::now();
            self.tick(dt)?;

            tick_count += 1;
            if self.config.max_ticks > 0 && tick_count >= self.config.max_ticks {
                info!(ticks = tick_count, "tick loop complete");
                return Ok(());
            }

            let elapsed = start.elapsed();
            if elapsed < budget {
                std::thread::sleep(budget - elapsed);
            } else {
                warn!(
                    tick_id = self.tick_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "tick exceeded time budget"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use engine_ecs::SystemDescriptor;

    use super::*;

    fn counting_system(name: &str, group: &str, counter: &Rc<Cell<u32>>) -> SystemDescriptor<f64> {
        let counter = Rc::clone(counter);
        SystemDescriptor::new(name).group(group).pre(move |_, _, _| {
            counter.set(counter.get() + 1);
            Ok(())
        })
    }

    #[test]
    fn test_tick_advances_counter() {
        let mut tick_loop = TickLoop::new(TickConfig::default());
        assert_eq!(tick_loop.tick_id(), 0);
        tick_loop.tick(1.0 / 60.0).unwrap();
        assert_eq!(tick_loop.tick_id(), 1);
        tick_loop.tick(1.0 / 60.0).unwrap();
        assert_eq!(tick_loop.tick_id(), 2);
    }

    #[test]
    fn test_tick_passes_timestep() {
        let seen = Rc::new(Cell::new(0.0_f64));
        let sink = Rc::clone(&seen);
        let mut tick_loop = TickLoop::new(TickConfig::default());
        tick_loop
            .world_mut()
            .register_system(SystemDescriptor::new("clock").pre(move |_, _, dt| {
                sink.set(sink.get() + *dt);
                Ok(())
            }))
            .unwrap();
        tick_loop.tick(0.5).unwrap();
        tick_loop.tick(0.25).unwrap();
        assert_eq!(seen.get(), 0.75);
    }

    #[test]
    fn test_group_config_limits_systems() {
        let (model, view) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));
        let config = TickConfig {
            group: Some("model".to_string()),
            ..TickConfig::default()
        };
        let mut tick_loop = TickLoop::new(config);
        let world = tick_loop.world_mut();
        world.register_system(counting_system("physics", "model", &model)).unwrap();
        world.register_system(counting_system("hud", "view", &view)).unwrap();

        tick_loop.tick(0.1).unwrap();
        assert_eq!((model.get(), view.get()), (1, 0));
    }

    #[test]
    fn test_run_limited_ticks() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 5,
            group: None,
        };
        let mut tick_loop = TickLoop::new(config);
        tick_loop.run().unwrap();
        assert_eq!(tick_loop.tick_id(), 5);
    }

    #[test]
    fn test_run_stops_on_failing_system() {
        let config = TickConfig {
            tick_rate: 1000.0,
            max_ticks: 10,
            group: None,
        };
        let mut tick_loop = TickLoop::new(config);
        tick_loop
            .world_mut()
            .register_system(SystemDescriptor::new("fragile").pre(|_, _, _| anyhow::bail!("broke")))
            .unwrap();
        assert!(tick_loop.run().is_err());
        assert_eq!(tick_loop.tick_id(), 1);
    }

    #[test]
    fn test_config_json_defaults() {
        let config: TickConfig = serde_json::from_str(r#"{ "max_ticks": 120 }"#).unwrap();
        assert_eq!(config.tick_rate, 60.0);
        assert_eq!(config.max_ticks, 120);
        assert_eq!(config.group, None);

        let config: TickConfig =
            serde_json::from_str(r#"{ "tick_rate": 30, "group": "view" }"#).unwrap();
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.group.as_deref(), Some("view"));
    }

    #[test]
    fn test_config_validation() {
        assert!(TickConfig::default().validate().is_ok());
        let bad = TickConfig {
            tick_rate: 0.0,
            ..TickConfig::default()
        };
        assert!(bad.validate().is_err());
        assert_eq!(TickConfig::default().budget(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn test_missing_config_file() {
        let err = TickConfig::from_json_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("reading tick config"));
    }
}
