//! Named events, dispatched synchronously to subscribed systems.
//!
//! Events bypass the `has`/`not` tick path entirely: a handler gets the raw
//! [`Args`] of the emit. [`EventHandler::EachEntity`] handlers are the one
//! exception, iterating a snapshot of the system's matched set the same way a
//! `for_each` pass does.

use std::collections::HashMap;
use std::fmt;

use engine_component::{Args, Entity};
use tracing::{debug, trace};

use crate::error::EcsError;
use crate::system::{EventHandler, HookKind, SystemId};
use crate::world::World;

/// Event name to subscriptions, in subscription order.
pub struct EventBus<G> {
    subscriptions: HashMap<String, Vec<(SystemId, EventHandler<G>)>>,
}

impl<G> EventBus<G> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: HashMap::new(),
        }
    }

    /// Append a subscription; earlier subscriptions to `event` run first.
    pub fn subscribe(&mut self, event: String, system: SystemId, handler: EventHandler<G>) {
        trace!(%system, event = %event, "subscribed");
        self.subscriptions
            .entry(event)
            .or_default()
            .push((system, handler));
    }

    /// Drop every subscription of `system`.
    pub fn unsubscribe(&mut self, system: SystemId) {
        self.subscriptions.retain(|_, subs| {
            subs.retain(|(id, _)| *id != system);
            !subs.is_empty()
        });
    }

    /// Subscriptions for `event`, cloned so they can be called while the
    /// world is borrowed mutably.
    #[must_use]
    pub fn subscribers(&self, event: &str) -> Vec<(SystemId, EventHandler<G>)> {
        self.subscriptions.get(event).cloned().unwrap_or_default()
    }

    /// Event names with at least one subscriber, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.subscriptions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl<G> Default for EventBus<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> fmt::Debug for EventBus<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscriptions
            .iter()
            .map(|(event, subs)| (event.as_str(), subs.len()))
            .collect();
        f.debug_struct("EventBus").field("subscriptions", &counts).finish()
    }
}

impl<G: 'static> World<G> {
    /// Dispatch `event` to every subscribed system, in schedule order. A
    /// system subscribed several times receives the event once per
    /// subscription, in subscription order.
    ///
    /// Each subscription first runs the system's `pre_handle` hook (if any)
    /// and then its handler. Returns the number of subscriptions dispatched;
    /// an event nobody listens to returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// The first failing `pre_handle` or handler aborts the dispatch.
    pub fn emit(&mut self, event: &str, args: &Args) -> Result<usize, EcsError> {
        let mut subscribers = self.events.subscribers(event);
        // Stable sort keeps subscription order within one system.
        subscribers.sort_by_key(|(id, _)| self.schedule.rank(*id));
        debug!(event, subscribers = subscribers.len(), "emitting event");

        for (id, handler) in &subscribers {
            self.dispatch(*id, handler, args)?;
        }
        Ok(subscribers.len())
    }

    fn dispatch(&mut self, id: SystemId, handler: &EventHandler<G>, args: &Args) -> Result<(), EcsError> {
        if let Some(pre_handle) = self.slot(id)?.hooks.pre_handle.clone() {
            pre_handle(self, id, args)
                .map_err(|source| self.hook_error(id, HookKind::PreHandle, source))?;
        }

        match handler {
            EventHandler::Once(f) => {
                f(self, id, args).map_err(|source| self.hook_error(id, HookKind::Event, source))
            }
            EventHandler::EachEntity(f) => {
                let snapshot: Vec<Entity> = self.matched(id)?.iter().copied().collect();
                for entity in snapshot {
                    if !self.is_matched(id, entity) {
                        continue;
                    }
                    f(self, entity, args)
                        .map_err(|source| self.hook_error(id, HookKind::Event, source))?;
                }
                Ok(())
            }
        }
    }

    /// Event names with at least one subscriber, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<&str> {
        self.events.events()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use engine_component::args;

    use super::*;
    use crate::system::SystemDescriptor;

    #[test]
    fn test_emit_without_subscribers() {
        let mut world: World<()> = World::new();
        assert_eq!(world.emit("nobody-home", &args![1]).unwrap(), 0);
    }

    #[test]
    fn test_emit_dispatches_in_schedule_order_with_raw_args() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world: World<()> = World::new();
        let (a, b) = (Rc::clone(&log), Rc::clone(&log));
        world
            .register_system(SystemDescriptor::new("late").order(3).on("hit", move |_, _, args| {
                a.borrow_mut().push(format!("late {}", args.i64(0)?));
                Ok(())
            }))
            .unwrap();
        world
            .register_system(SystemDescriptor::new("early").order(-1).on("hit", move |_, _, args| {
                b.borrow_mut().push(format!("early {}", args.str(1)?));
                Ok(())
            }))
            .unwrap();

        let dispatched = world.emit("hit", &args![7, "boom"]).unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(*log.borrow(), vec!["early boom", "late 7"]);
        assert_eq!(world.events(), vec!["hit"]);
    }

    #[test]
    fn test_pre_handle_runs_before_handler() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut world: World<()> = World::new();
        let (a, b) = (Rc::clone(&log), Rc::clone(&log));
        world
            .register_system(
                SystemDescriptor::new("input")
                    .pre_handle(move |_, _, _| {
                        a.borrow_mut().push("pre_handle");
                        Ok(())
                    })
                    .on("keydown", move |_, _, _| {
                        b.borrow_mut().push("keydown");
                        Ok(())
                    }),
            )
            .unwrap();
        world.emit("keydown", &args!["ArrowUp"]).unwrap();
        assert_eq!(*log.borrow(), vec!["pre_handle", "keydown"]);
    }

    #[test]
    fn test_each_entity_handler_visits_matched_set() {
        let mut world: World<()> = World::new();
        world.register_tag("enemy").unwrap();
        world.register_tag("stunned").unwrap();
        world
            .register_system(SystemDescriptor::new("stun").has(["enemy"]).on_each(
                "flash",
                |world, entity, _| {
                    world.add(entity, "stunned", args![])?;
                    Ok(())
                },
            ))
            .unwrap();
        let a = world.create_entity().unwrap();
        let bystander = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add(a, "enemy", args![]).unwrap();
        world.add(b, "enemy", args![]).unwrap();

        world.emit("flash", &Args::new()).unwrap();
        assert_eq!(world.entities_with(&["stunned"]), vec![a, b]);
        assert!(!world.has(bystander, "stunned"));
    }

    #[test]
    fn test_each_entity_handler_skips_entities_that_left() {
        let visits = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&visits);
        let mut world: World<()> = World::new();
        world.register_tag("enemy").unwrap();
        world
            .register_system(SystemDescriptor::new("cull").has(["enemy"]).on_each(
                "cull",
                move |world, entity, _| {
                    seen.borrow_mut().push(entity);
                    for other in world.other_entities(&["enemy"], entity) {
                        world.destroy(other, true)?;
                    }
                    Ok(())
                },
            ))
            .unwrap();
        let first = world.create_entity().unwrap();
        let second = world.create_entity().unwrap();
        world.add(first, "enemy", args![]).unwrap();
        world.add(second, "enemy", args![]).unwrap();

        world.emit("cull", &Args::new()).unwrap();
        assert_eq!(*visits.borrow(), vec![first]);
        assert_eq!(world.entities(), vec![first]);
    }

    #[test]
    fn test_subscribe_from_mounted() {
        let hits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&hits);
        let mut world: World<()> = World::new();
        world
            .register_system(SystemDescriptor::new("late-subscriber").mounted(move |world, id| {
                let counter = Rc::clone(&counter);
                world.subscribe(
                    id,
                    "tick",
                    EventHandler::once(move |_, _, _| {
                        *counter.borrow_mut() += 1;
                        Ok(())
                    }),
                )?;
                Ok(())
            }))
            .unwrap();
        world.emit("tick", &Args::new()).unwrap();
        world.emit("tick", &Args::new()).unwrap();
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn test_failing_handler_aborts_dispatch() {
        let reached = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&reached);
        let mut world: World<()> = World::new();
        world
            .register_system(
                SystemDescriptor::new("grumpy").on("ping", |_, _, _| anyhow::bail!("not today")),
            )
            .unwrap();
        world
            .register_system(SystemDescriptor::new("after").order(1).on("ping", move |_, _, _| {
                *flag.borrow_mut() = true;
                Ok(())
            }))
            .unwrap();
        let err = world.emit("ping", &Args::new()).unwrap_err();
        assert!(matches!(err, EcsError::Hook { hook: HookKind::Event, .. }));
        assert!(!*reached.borrow());
    }
}
