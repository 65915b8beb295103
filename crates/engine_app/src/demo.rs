//! A small walking-crowd world to drive from the command line.
//!
//! Walkers move every tick unless stunned. A director system periodically
//! emits `stun` at one walker and later `thaw` at all of them, so the
//! movement system's matched set visibly shrinks and recovers.

use std::cell::Cell;
use std::rc::Rc;

use engine_component::{Args, Entity, args};
use engine_ecs::{SystemDescriptor, World};
use glam::Vec2;
use tracing::{debug, info, trace};

/// Ticks between director actions.
const DIRECTOR_PERIOD: u64 = 20;

fn vec2(a: &Args) -> anyhow::Result<Vec2> {
    Ok(Vec2::new(a.f32_or(0, 0.0)?, a.f32_or(1, 0.0)?))
}

/// Register the demo's components and systems.
///
/// # Errors
///
/// Registration conflicts with something already in `world`.
pub fn register(world: &mut World<f64>) -> anyhow::Result<()> {
    world.register_component("position", vec2)?;
    world.register_component("velocity", vec2)?;
    world.register_component("name", |a: &Args| Ok(a.str(0)?.to_string()))?;
    world.register_tag("hidden")?;
    world.register_tag("stunned")?;

    world.register_system(director())?;
    world.register_system(movement())?;
    world.register_system(reporter())?;
    world.register_system(greeter())?;
    world.register_system(stun())?;
    Ok(())
}

/// Spawn `count` named walkers; every third one is hidden from the reporter.
///
/// # Errors
///
/// A failing constructor or `enter` hook.
pub fn populate(world: &mut World<f64>, count: usize) -> anyhow::Result<Vec<Entity>> {
    (0..count)
        .map(|i| -> anyhow::Result<Entity> {
            let walker = world.create_entity()?;
            world.add_many(
                walker,
                [
                    ("name", args![format!("walker-{i}")]),
                    ("position", args![i as f64, 0.0]),
                    ("velocity", args![1.0, 0.5]),
                ],
            )?;
            if i % 3 == 2 {
                world.add(walker, "hidden", args![])?;
            }
            Ok(walker)
        })
        .collect()
}

fn director() -> SystemDescriptor<f64> {
    let ticks = Cell::new(0u64);
    SystemDescriptor::new("director")
        .group("model")
        .order(-10)
        .pre(move |world, _, _| {
            let tick = ticks.get() + 1;
            ticks.set(tick);
            match tick % DIRECTOR_PERIOD {
                0 => {
                    world.emit("thaw", &Args::new())?;
                }
                phase if phase == DIRECTOR_PERIOD / 2 => {
                    if let Some(target) = world.entities_with(&["velocity"]).first() {
                        world.emit("stun", &args![target.id()])?;
                    }
                }
                _ => {}
            }
            Ok(())
        })
}

fn movement() -> SystemDescriptor<f64> {
    SystemDescriptor::new("movement")
        .group("model")
        .has(["position", "velocity"])
        .not(["stunned"])
        .for_each_components(|mut c, _, dt| {
            let (position, velocity) = c
                .pair_mut::<Vec2, Vec2>(0, 1)
                .ok_or_else(|| anyhow::anyhow!("position/velocity are not Vec2"))?;
            *position += *velocity * (*dt as f32);
            Ok(())
        })
}

fn reporter() -> SystemDescriptor<f64> {
    let visible = Rc::new(Cell::new(0usize));
    let (reset, count, report) = (Rc::clone(&visible), Rc::clone(&visible), visible);
    SystemDescriptor::new("reporter")
        .group("view")
        .order(10)
        .has(["position", "name"])
        .not(["hidden"])
        .pre(move |_, _, _| {
            reset.set(0);
            Ok(())
        })
        .for_each(move |world, entity, _| {
            count.set(count.get() + 1);
            if let (Some(name), Some(position)) = (
                world.get::<String>(entity, "name"),
                world.get::<Vec2>(entity, "position"),
            ) {
                trace!(%entity, name = %name, x = position.x, y = position.y, "walker");
            }
            Ok(())
        })
        .post(move |_, _, _| {
            debug!(visible = report.get(), "frame reported");
            Ok(())
        })
}

fn greeter() -> SystemDescriptor<f64> {
    SystemDescriptor::new("greeter")
        .has(["name"])
        .enter(|world, entity| {
            let name = world.get::<String>(entity, "name").map_or("?", String::as_str);
            info!(%entity, name, "walker joined");
            Ok(())
        })
        .leave(|world, entity| {
            let name = world.get::<String>(entity, "name").map_or("?", String::as_str);
            info!(%entity, name, "walker left");
            Ok(())
        })
}

fn stun() -> SystemDescriptor<f64> {
    SystemDescriptor::new("stun")
        .has(["velocity"])
        .on("stun", |world, _, args| {
            let target = Entity::from_raw(u64::try_from(args.i64(0)?)?);
            if world.contains(target) {
                world.add(target, "stunned", args![])?;
                info!(entity = %target, "walker stunned");
            }
            Ok(())
        })
        .on_each("thaw", |world, entity, _| {
            if world.remove(entity, "stunned")? {
                info!(%entity, "walker thawed");
            }
            Ok(())
        })
}

/// Log how many entities each system currently holds.
pub fn summarize(world: &World<f64>) {
    info!(entities = world.entity_count(), systems = world.system_count(), "world summary");
    for &id in world.schedule() {
        if let (Ok(name), Ok(matched)) = (world.system_name(id), world.matched(id)) {
            info!(system = name, matched = matched.len(), "system summary");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_world(walkers: usize) -> (World<f64>, Vec<Entity>) {
        let mut world = World::new();
        register(&mut world).unwrap();
        let entities = populate(&mut world, walkers).unwrap();
        (world, entities)
    }

    fn system(world: &World<f64>, name: &str) -> engine_ecs::SystemId {
        world.system_by_name(name).unwrap()
    }

    #[test]
    fn test_populate_enrolls_walkers() {
        let (world, walkers) = demo_world(6);
        assert_eq!(walkers.len(), 6);
        assert_eq!(world.matched(system(&world, "movement")).unwrap().len(), 6);
        assert_eq!(world.matched(system(&world, "greeter")).unwrap().len(), 6);
        assert_eq!(world.matched(system(&world, "reporter")).unwrap().len(), 4);
    }

    #[test]
    fn test_movement_scales_by_timestep() {
        let (mut world, walkers) = demo_world(2);
        world.run_group("model", &0.5).unwrap();
        assert_eq!(world.get::<Vec2>(walkers[1], "position"), Some(&Vec2::new(1.5, 0.25)));
    }

    #[test]
    fn test_stun_and_thaw_events() {
        let (mut world, walkers) = demo_world(2);
        let movement = system(&world, "movement");

        world.emit("stun", &args![walkers[0].id()]).unwrap();
        assert!(world.has(walkers[0], "stunned"));
        assert!(!world.is_matched(movement, walkers[0]));

        world.run(&1.0).unwrap();
        assert_eq!(world.get::<Vec2>(walkers[0], "position"), Some(&Vec2::ZERO));

        world.emit("thaw", &Args::new()).unwrap();
        assert!(world.is_matched(movement, walkers[0]));
    }

    #[test]
    fn test_director_cycles_stun() {
        let (mut world, walkers) = demo_world(3);
        let movement = system(&world, "movement");
        for _ in 0..DIRECTOR_PERIOD / 2 {
            world.run_group("model", &0.0).unwrap();
        }
        assert!(world.has(walkers[0], "stunned"));
        assert_eq!(world.matched(movement).unwrap().len(), 2);

        for _ in 0..DIRECTOR_PERIOD / 2 {
            world.run_group("model", &0.0).unwrap();
        }
        assert!(!world.has(walkers[0], "stunned"));
        assert_eq!(world.matched(movement).unwrap().len(), 3);
    }
}
