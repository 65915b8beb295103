//! System scheduler: run order, group filtering and the per-tick pass.
//!
//! Systems run in ascending `order`, ties broken by registration order. The
//! same `(order, id)` key sorts both the full schedule and every group's
//! schedule, so filtering by group never reorders systems relative to each
//! other.
//!
//! A pass works from snapshots: the list of systems is copied before the first
//! system runs, and each system copies its matched set before `pre`. Callbacks
//! may therefore register systems or add, remove and destroy entities freely.
//! Systems registered mid-pass first run on the next pass; entities that
//! joined a system mid-pass are first visited on the next pass; entities that
//! left or were destroyed before their turn are skipped.

use std::collections::HashMap;

use engine_component::Entity;
use tracing::{debug, trace};

use crate::error::EcsError;
use crate::system::{ForEach, FetchedComponents, HookKind, SystemId, SystemState};
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct ScheduleKey {
    order: i32,
    id: SystemId,
}

/// The ordered list of systems, plus one ordered list per group.
#[derive(Debug, Default)]
pub struct Schedule {
    all: Vec<ScheduleKey>,
    groups: HashMap<String, Vec<ScheduleKey>>,
    /// Cached `all` without the keys, for cheap snapshots.
    ids: Vec<SystemId>,
}

impl Schedule {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a system at its sorted position.
    pub fn insert(&mut self, id: SystemId, order: i32, group: Option<&str>) {
        let key = ScheduleKey { order, id };
        insert_sorted(&mut self.all, key);
        if let Some(group) = group {
            insert_sorted(self.groups.entry(group.to_string()).or_default(), key);
        }
        self.ids = self.all.iter().map(|k| k.id).collect();
    }

    /// Drop a system from the full schedule and its group. Groups left
    /// empty disappear.
    pub fn remove(&mut self, id: SystemId) {
        self.all.retain(|k| k.id != id);
        self.groups.retain(|_, keys| {
            keys.retain(|k| k.id != id);
            !keys.is_empty()
        });
        self.ids = self.all.iter().map(|k| k.id).collect();
    }

    /// Every system, in run order.
    #[must_use]
    pub fn ids(&self) -> &[SystemId] {
        &self.ids
    }

    /// The systems of `group`, in run order. Unknown groups are empty.
    #[must_use]
    pub fn group(&self, group: &str) -> Vec<SystemId> {
        self.groups
            .get(group)
            .map(|keys| keys.iter().map(|k| k.id).collect())
            .unwrap_or_default()
    }

    /// Group names, sorted.
    #[must_use]
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Position of `id` in the full run order.
    #[must_use]
    pub fn rank(&self, id: SystemId) -> Option<usize> {
        self.ids.iter().position(|&other| other == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.all.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

fn insert_sorted(keys: &mut Vec<ScheduleKey>, key: ScheduleKey) {
    let at = keys.partition_point(|existing| *existing < key);
    keys.insert(at, key);
}

impl<G: 'static> World<G> {
    /// Run every system once, in schedule order, passing `arg` to each hook.
    ///
    /// # Errors
    ///
    /// The first failing hook aborts the rest of the pass.
    pub fn run(&mut self, arg: &G) -> Result<(), EcsError> {
        let ids = self.schedule.ids().to_vec();
        debug!(systems = ids.len(), "running schedule");
        self.run_pass(&ids, arg)
    }

    /// Run only the systems tagged with `group`, in schedule order. An
    /// unknown group runs nothing.
    ///
    /// # Errors
    ///
    /// The first failing hook aborts the rest of the pass.
    pub fn run_group(&mut self, group: &str, arg: &G) -> Result<(), EcsError> {
        let ids = self.schedule.group(group);
        debug!(group, systems = ids.len(), "running group");
        self.run_pass(&ids, arg)
    }

    fn run_pass(&mut self, ids: &[SystemId], arg: &G) -> Result<(), EcsError> {
        for &id in ids {
            if self.slot(id)?.state == SystemState::Running {
                trace!(system = %id, "skipping system already running in an outer pass");
                continue;
            }
            self.run_system(id, arg)?;
        }
        Ok(())
    }

    /// Run a single system: `pre`, then the per-entity callback over a
    /// snapshot of its matched set, then `post`.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`], or the first failing hook.
    pub fn run_system(&mut self, id: SystemId, arg: &G) -> Result<(), EcsError> {
        let slot = self.slot_mut(id)?;
        let previous = slot.state;
        slot.state = SystemState::Running;

        let result = self.run_system_hooks(id, arg);

        if let Ok(slot) = self.slot_mut(id) {
            slot.state = previous;
        }
        result
    }

    fn run_system_hooks(&mut self, id: SystemId, arg: &G) -> Result<(), EcsError> {
        let slot = self.slot(id)?;
        let pre = slot.hooks.pre.clone();
        let for_each = slot.hooks.for_each.clone();
        let post = slot.hooks.post.clone();
        let has = slot.query.has.clone();
        let snapshot: Vec<Entity> = slot.matched.iter().copied().collect();

        if let Some(pre) = pre {
            pre(self, id, arg).map_err(|source| self.hook_error(id, HookKind::Pre, source))?;
        }

        if let Some(for_each) = for_each {
            for entity in snapshot {
                if !self.is_matched(id, entity) {
                    continue;
                }
                let result = match &for_each {
                    ForEach::Entity(f) => f(self, entity, arg),
                    ForEach::Components(f) => match self.fetch_components(entity, &has) {
                        Some(fetched) => f(fetched, entity, arg),
                        None => continue,
                    },
                };
                result.map_err(|source| self.hook_error(id, HookKind::ForEach, source))?;
            }
        }

        if let Some(post) = post {
            post(self, id, arg).map_err(|source| self.hook_error(id, HookKind::Post, source))?;
        }
        Ok(())
    }

    /// Borrow `names` from `entity` mutably, in the order given.
    fn fetch_components(&mut self, entity: Entity, names: &[String]) -> Option<FetchedComponents<'_>> {
        let record = self.entities.get_mut(&entity)?;
        let mut slots: Vec<Option<&mut dyn std::any::Any>> = names.iter().map(|_| None).collect();
        for (name, value) in &mut record.components {
            if let Some(index) = names.iter().position(|n| n == name) {
                slots[index] = Some(&mut **value);
            }
        }
        let items: Option<Vec<_>> = slots.into_iter().collect();
        items.map(FetchedComponents::new)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine_component::Args;

    use super::*;
    use crate::system::SystemDescriptor;

    fn id(n: usize) -> SystemId {
        SystemId::new(n)
    }

    #[test]
    fn test_schedule_orders_by_order_then_registration() {
        let mut schedule = Schedule::new();
        schedule.insert(id(0), 5, None);
        schedule.insert(id(1), -1, None);
        schedule.insert(id(2), 5, None);
        schedule.insert(id(3), 0, None);
        assert_eq!(schedule.ids(), &[id(1), id(3), id(0), id(2)]);
        assert_eq!(schedule.rank(id(0)), Some(2));
        assert_eq!(schedule.rank(id(9)), None);
    }

    #[test]
    fn test_remove_keeps_remaining_order() {
        let mut schedule = Schedule::new();
        schedule.insert(id(0), 1, Some("model"));
        schedule.insert(id(1), 0, Some("view"));
        schedule.insert(id(2), 1, Some("model"));
        schedule.remove(id(1));
        assert_eq!(schedule.ids(), &[id(0), id(2)]);
        assert_eq!(schedule.group_names(), vec!["model"]);
        schedule.remove(id(0));
        assert_eq!(schedule.group("model"), vec![id(2)]);
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn test_group_order_is_subsequence_of_full_order() {
        let mut schedule = Schedule::new();
        schedule.insert(id(0), 3, Some("model"));
        schedule.insert(id(1), 1, Some("view"));
        schedule.insert(id(2), 2, Some("model"));
        schedule.insert(id(3), 0, Some("model"));
        schedule.insert(id(4), 2, None);

        let model = schedule.group("model");
        assert_eq!(model, vec![id(3), id(2), id(0)]);
        let filtered: Vec<SystemId> = schedule
            .ids()
            .iter()
            .copied()
            .filter(|s| model.contains(s))
            .collect();
        assert_eq!(filtered, model);
        assert!(schedule.group("missing").is_empty());
        assert_eq!(schedule.group_names(), vec!["model", "view"]);
    }

    fn recording_system(name: &str, log: &Rc<RefCell<Vec<String>>>) -> SystemDescriptor<()> {
        let pre_log = Rc::clone(log);
        let post_log = Rc::clone(log);
        let pre_name = name.to_string();
        let post_name = name.to_string();
        SystemDescriptor::new(name)
            .pre(move |_, _, _| {
                pre_log.borrow_mut().push(format!("{pre_name}:pre"));
                Ok(())
            })
            .post(move |_, _, _| {
                post_log.borrow_mut().push(format!("{post_name}:post"));
                Ok(())
            })
    }

    #[test]
    fn test_run_group_preserves_relative_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world: World<()> = World::new();
        world
            .register_system(recording_system("late", &log).order(10).group("model"))
            .unwrap();
        world
            .register_system(recording_system("view", &log).order(5).group("view"))
            .unwrap();
        world
            .register_system(recording_system("early", &log).order(-3).group("model"))
            .unwrap();

        world.run_group("model", &()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["early:pre", "early:post", "late:pre", "late:post"]
        );

        log.borrow_mut().clear();
        world.run(&()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "early:pre",
                "early:post",
                "view:pre",
                "view:post",
                "late:pre",
                "late:post"
            ]
        );
    }

    #[test]
    fn test_failing_pre_aborts_the_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world: World<()> = World::new();
        world
            .register_system(SystemDescriptor::new("broken").pre(|_, _, _| anyhow::bail!("boom")))
            .unwrap();
        world
            .register_system(recording_system("after", &log).order(1))
            .unwrap();

        let err = world.run(&()).unwrap_err();
        assert!(matches!(err, EcsError::Hook { hook: HookKind::Pre, ref system, .. } if system == "broken"));
        assert!(log.borrow().is_empty());
        let broken = world.system_by_name("broken").unwrap();
        assert_eq!(world.system_state(broken).unwrap(), SystemState::Active);
    }

    #[test]
    fn test_global_argument_reaches_every_hook() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut world: World<f64> = World::new();
        let (a, b, c) = (Rc::clone(&seen), Rc::clone(&seen), Rc::clone(&seen));
        world
            .register_system(
                SystemDescriptor::new("dt")
                    .pre(move |_, _, dt| {
                        a.borrow_mut().push(*dt);
                        Ok(())
                    })
                    .for_each(move |_, _, dt| {
                        b.borrow_mut().push(*dt);
                        Ok(())
                    })
                    .post(move |_, _, dt| {
                        c.borrow_mut().push(*dt);
                        Ok(())
                    }),
            )
            .unwrap();
        world.create_entity().unwrap();
        world.run(&0.25).unwrap();
        assert_eq!(*seen.borrow(), vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_nested_run_skips_running_system() {
        let visits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&visits);
        let mut world: World<()> = World::new();
        world
            .register_system(SystemDescriptor::new("reentrant").pre(move |world, _, arg| {
                *counter.borrow_mut() += 1;
                world.run(arg)?;
                Ok(())
            }))
            .unwrap();
        world.run(&()).unwrap();
        assert_eq!(*visits.borrow(), 1);
    }

    #[test]
    fn test_components_calling_convention_follows_has_order() {
        let mut world: World<()> = World::new();
        world
            .register_component("position", |a: &Args| Ok([a.f64(0)?, a.f64(1)?]))
            .unwrap();
        world
            .register_component("velocity", |a: &Args| Ok([a.f64(0)?, a.f64(1)?]))
            .unwrap();
        world
            .register_system(
                SystemDescriptor::new("move")
                    .has(["velocity", "position"])
                    .for_each_components(|mut c, _, _| {
                        let (vel, pos) = c
                            .pair_mut::<[f64; 2], [f64; 2]>(0, 1)
                            .ok_or_else(|| anyhow::anyhow!("missing components"))?;
                        pos[0] += vel[0];
                        pos[1] += vel[1];
                        Ok(())
                    }),
            )
            .unwrap();

        let e = world.create_entity().unwrap();
        world.add(e, "position", engine_component::args![1, 1]).unwrap();
        world.add(e, "velocity", engine_component::args![2, 3]).unwrap();
        world.run(&()).unwrap();
        assert_eq!(world.get::<[f64; 2]>(e, "position"), Some(&[3.0, 4.0]));
        assert_eq!(world.get::<[f64; 2]>(e, "velocity"), Some(&[2.0, 3.0]));
    }
}
