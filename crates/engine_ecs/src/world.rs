//! The world: owner of entities, component constructors, systems and events.
//!
//! A [`World`] is an ordinary value. Several can coexist, each with its own
//! entity identities, component names and systems.
//!
//! `G` is the global argument threaded through [`World::run`] to every
//! `pre`/`for_each`/`post` hook, typically a timestep. The engine never
//! inspects it.
//!
//! Membership bookkeeping lives in [`matching`](crate::matching), the per-tick
//! pass in [`scheduler`](crate::scheduler) and event dispatch in
//! [`events`](crate::events); this module holds registration, entity
//! lifecycle and read access.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use engine_component::{Args, ComponentBox, ComponentRegistry, Entity, EntityAllocator};
use tracing::debug;

use crate::error::{DescriptorError, EcsError};
use crate::events::EventBus;
use crate::scheduler::Schedule;
use crate::system::{
    EventHandler, HookKind, SystemDescriptor, SystemId, SystemSlot, SystemState,
};

/// Components attached to one live entity.
#[derive(Default)]
pub(crate) struct EntityRecord {
    pub(crate) components: HashMap<String, ComponentBox>,
    /// Set for the duration of `destroy`: reads still work, mutations fail.
    pub(crate) despawning: bool,
}

/// The registry of entities, components and systems.
pub struct World<G = ()> {
    pub(crate) components: ComponentRegistry,
    allocator: EntityAllocator,
    pub(crate) entities: BTreeMap<Entity, EntityRecord>,
    pub(crate) systems: Vec<SystemSlot<G>>,
    pub(crate) schedule: Schedule,
    pub(crate) events: EventBus<G>,
    /// Memberships recorded but not yet announced with `enter`.
    pub(crate) pending_enter: BTreeSet<(SystemId, Entity)>,
}

impl<G: 'static> World<G> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: ComponentRegistry::new(),
            allocator: EntityAllocator::new(),
            entities: BTreeMap::new(),
            systems: Vec::new(),
            schedule: Schedule::new(),
            events: EventBus::new(),
            pending_enter: BTreeSet::new(),
        }
    }

    // -- Registration --

    /// Register a component name with a typed constructor.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Duplicate`](engine_component::ComponentError::Duplicate)
    /// if the name is taken.
    pub fn register_component<T, F>(&mut self, name: &str, constructor: F) -> Result<(), EcsError>
    where
        T: Any,
        F: Fn(&Args) -> anyhow::Result<T> + 'static,
    {
        Ok(self.components.register(name, constructor)?)
    }

    /// Register a component name whose instances are
    /// [`DefaultComponent`](engine_component::DefaultComponent)s holding
    /// their first argument.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Duplicate`](engine_component::ComponentError::Duplicate)
    /// if the name is taken.
    pub fn register_tag(&mut self, name: &str) -> Result<(), EcsError> {
        Ok(self.components.register_default(name)?)
    }

    /// Register a system.
    ///
    /// In order: the descriptor is validated, the system is placed in the
    /// schedule (and its group), its event subscriptions are recorded,
    /// `mounted` runs once, and finally every live entity that already
    /// matches joins the system, firing `enter` for each.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidSystem`] for an empty or duplicate name or a
    /// malformed `has`/`not`. [`EcsError::Hook`] if `mounted` fails, in which
    /// case the registration is rolled back and the name is free again, or
    /// if an `enter` fails, in which case the system stays registered.
    pub fn register_system(&mut self, descriptor: SystemDescriptor<G>) -> Result<SystemId, EcsError> {
        let SystemDescriptor {
            name,
            query,
            group,
            order,
            hooks,
            subscriptions,
        } = descriptor;

        let invalid = |reason: DescriptorError| EcsError::InvalidSystem {
            system: name.clone(),
            reason,
        };
        if name.is_empty() {
            return Err(invalid(DescriptorError::EmptyName));
        }
        if self.system_by_name(&name).is_some() {
            return Err(invalid(DescriptorError::DuplicateName));
        }
        query.validate().map_err(|e| invalid(e.into()))?;

        let id = SystemId::new(self.systems.len());
        self.schedule.insert(id, order, group.as_deref());
        debug!(system = %id, name = %name, ?group, order, "registered system");

        let mounted = hooks.mounted.clone();
        self.systems.push(SystemSlot {
            name,
            query,
            group,
            order,
            hooks,
            state: SystemState::Unmounted,
            matched: BTreeSet::new(),
            retired: false,
        });
        for (event, handler) in subscriptions {
            self.events.subscribe(event, id, handler);
        }

        if let Some(mounted) = mounted {
            if let Err(source) = mounted(self, id) {
                let err = self.hook_error(id, HookKind::Mounted, source);
                self.retire(id);
                return Err(err);
            }
        }
        self.slot_mut(id)?.state = SystemState::Mounted;

        let joining = self.populate(id);
        self.slot_mut(id)?.state = SystemState::Active;
        for entity in joining {
            if let Err(err) = self.fire_pending_enters(&[id], entity) {
                self.pending_enter.retain(|&(system, _)| system != id);
                return Err(err);
            }
        }
        Ok(id)
    }

    /// Undo a registration whose `mounted` hook failed. The slot stays so
    /// ids handed out since remain valid, but the system is unreachable.
    fn retire(&mut self, id: SystemId) {
        self.schedule.remove(id);
        self.events.unsubscribe(id);
        self.pending_enter.retain(|&(system, _)| system != id);
        if let Some(slot) = self.systems.get_mut(id.index()) {
            slot.retired = true;
            slot.matched.clear();
        }
        debug!(system = %id, "rolled back system registration");
    }

    /// Subscribe an already registered system to `event`, e.g. from its
    /// `mounted` hook.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`].
    pub fn subscribe(
        &mut self,
        system: SystemId,
        event: impl Into<String>,
        handler: EventHandler<G>,
    ) -> Result<(), EcsError> {
        self.slot(system)?;
        self.events.subscribe(event.into(), system, handler);
        Ok(())
    }

    // -- Entity lifecycle --

    /// Create an entity with no components. It immediately joins every system
    /// whose predicate an empty entity satisfies.
    ///
    /// # Errors
    ///
    /// A failing `enter` hook; the entity still exists.
    pub fn create_entity(&mut self) -> Result<Entity, EcsError> {
        let entity = self.allocator.allocate();
        self.entities.insert(entity, EntityRecord::default());
        debug!(%entity, "created entity");
        self.update_membership(entity)?;
        Ok(entity)
    }

    /// Attach a component built from `args`. Replacing a component the
    /// entity already has keeps its memberships unchanged.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], an unknown component name or failing
    /// constructor, or a failing `enter`/`leave` hook.
    pub fn add(&mut self, entity: Entity, name: &str, args: Args) -> Result<(), EcsError> {
        self.add_many(entity, [(name, args)])
    }

    /// Attach several components as one mutation: memberships are compared
    /// once, before and after the whole batch. Every constructor runs before
    /// anything is attached, so a failing constructor leaves the entity as it
    /// was.
    ///
    /// # Errors
    ///
    /// As [`World::add`].
    pub fn add_many<'n, I>(&mut self, entity: Entity, batch: I) -> Result<(), EcsError>
    where
        I: IntoIterator<Item = (&'n str, Args)>,
    {
        self.live_record(entity)?;
        let built = batch
            .into_iter()
            .map(|(name, args)| -> Result<(String, ComponentBox), EcsError> {
                Ok((name.to_string(), self.components.construct(name, &args)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = self.live_record(entity)?;
        for (name, component) in built {
            record.components.insert(name, component);
        }
        self.update_membership(entity)
    }

    /// Detach a component. Returns whether the entity had it.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], an unknown component name, or a failing
    /// `enter`/`leave` hook.
    pub fn remove(&mut self, entity: Entity, name: &str) -> Result<bool, EcsError> {
        Ok(self.remove_many(entity, [name])? == 1)
    }

    /// Detach several components as one mutation. Returns how many were
    /// actually present.
    ///
    /// # Errors
    ///
    /// As [`World::remove`]. Names are checked before anything is detached.
    pub fn remove_many<'n, I>(&mut self, entity: Entity, names: I) -> Result<usize, EcsError>
    where
        I: IntoIterator<Item = &'n str>,
    {
        self.live_record(entity)?;
        let names: Vec<&str> = names.into_iter().collect();
        if let Some(unknown) = names.iter().find(|n| !self.components.contains(n)) {
            return Err(engine_component::ComponentError::Unknown(unknown.to_string()).into());
        }

        let record = self.live_record(entity)?;
        let mut removed = 0;
        for name in names {
            if record.components.remove(name).is_some() {
                removed += 1;
            }
        }
        if removed == 0 {
            return Ok(0);
        }
        self.update_membership(entity)?;
        Ok(removed)
    }

    /// Detach every component as one mutation. Returns how many there were.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], or a failing `enter`/`leave` hook.
    pub fn clear(&mut self, entity: Entity) -> Result<usize, EcsError> {
        let names: Vec<String> = self.live_record(entity)?.components.keys().cloned().collect();
        self.remove_many(entity, names.iter().map(String::as_str))
    }

    /// Destroy an entity.
    ///
    /// With `trigger_lifecycle`, `leave` fires for every system the entity
    /// was in; the hooks can still read its components. Without it, the entity
    /// silently drops out of every system. Either way its identity is retired
    /// and later operations on it fail with [`EcsError::StaleEntity`].
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], or a failing `leave` hook. The entity is
    /// destroyed even when a hook fails.
    pub fn destroy(&mut self, entity: Entity, trigger_lifecycle: bool) -> Result<(), EcsError> {
        self.live_record(entity)?.despawning = true;

        let member_of = self.member_of(entity);
        let left: Vec<SystemId> = member_of
            .iter()
            .copied()
            .filter(|&id| self.withdraw(id, entity))
            .collect();

        let result = if trigger_lifecycle {
            left.iter().try_for_each(|&id| self.fire_leave(id, entity))
        } else {
            Ok(())
        };

        self.entities.remove(&entity);
        debug!(%entity, systems = member_of.len(), trigger_lifecycle, "destroyed entity");
        result
    }

    /// A handle for chained mutation of one entity.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`].
    pub fn entity_mut(&mut self, entity: Entity) -> Result<EntityMut<'_, G>, EcsError> {
        self.live_record(entity)?;
        Ok(EntityMut {
            world: self,
            entity,
        })
    }

    // -- Entity queries --

    /// `true` while the entity is live and not being destroyed.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.get(&entity).is_some_and(|r| !r.despawning)
    }

    /// All live entities, ascending by id.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.live().map(|(&e, _)| e).collect()
    }

    /// Live entities holding every component in `has`.
    #[must_use]
    pub fn entities_with(&self, has: &[&str]) -> Vec<Entity> {
        self.live()
            .filter(|(_, r)| has.iter().all(|c| r.components.contains_key(*c)))
            .map(|(&e, _)| e)
            .collect()
    }

    /// As [`World::entities_with`], leaving out `excluded`.
    #[must_use]
    pub fn other_entities(&self, has: &[&str], excluded: Entity) -> Vec<Entity> {
        let mut found = self.entities_with(has);
        found.retain(|&e| e != excluded);
        found
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.live().count()
    }

    fn live(&self) -> impl Iterator<Item = (&Entity, &EntityRecord)> {
        self.entities.iter().filter(|(_, r)| !r.despawning)
    }

    /// Whether `entity` currently has component `name`. `false` for
    /// destroyed entities.
    #[must_use]
    pub fn has(&self, entity: Entity, name: &str) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|r| r.components.contains_key(name))
    }

    /// The component `name` of `entity` as a `T`. `None` if the entity is
    /// gone, lacks the component, or the component is not a `T`.
    #[must_use]
    pub fn get<T: Any>(&self, entity: Entity, name: &str) -> Option<&T> {
        self.entities
            .get(&entity)?
            .components
            .get(name)?
            .downcast_ref()
    }

    /// Mutable counterpart of [`World::get`]. Mutating a component's data
    /// never changes memberships.
    #[must_use]
    pub fn get_mut<T: Any>(&mut self, entity: Entity, name: &str) -> Option<&mut T> {
        self.entities
            .get_mut(&entity)?
            .components
            .get_mut(name)?
            .downcast_mut()
    }

    /// Names of the components on `entity`, sorted.
    #[must_use]
    pub fn component_names(&self, entity: Entity) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .entities
            .get(&entity)
            .map(|r| r.components.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    #[must_use]
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    // -- System queries --

    /// The entities currently matching `system`, ascending by id.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`].
    pub fn matched(&self, system: SystemId) -> Result<&BTreeSet<Entity>, EcsError> {
        Ok(&self.slot(system)?.matched)
    }

    /// Whether `entity` is in `system`'s matched set. `false` for unknown
    /// systems.
    #[must_use]
    pub fn is_matched(&self, system: SystemId, entity: Entity) -> bool {
        self.slot(system).is_ok_and(|s| s.matched.contains(&entity))
    }

    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`].
    pub fn system_state(&self, system: SystemId) -> Result<SystemState, EcsError> {
        Ok(self.slot(system)?.state)
    }

    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`].
    pub fn system_name(&self, system: SystemId) -> Result<&str, EcsError> {
        Ok(&self.slot(system)?.name)
    }

    /// # Errors
    ///
    /// [`EcsError::UnknownSystem`].
    pub fn system_group(&self, system: SystemId) -> Result<Option<&str>, EcsError> {
        Ok(self.slot(system)?.group.as_deref())
    }

    #[must_use]
    pub fn system_by_name(&self, name: &str) -> Option<SystemId> {
        self.systems
            .iter()
            .position(|s| !s.retired && s.name == name)
            .map(SystemId::new)
    }

    /// Systems in the order a full [`World::run`] visits them.
    #[must_use]
    pub fn schedule(&self) -> &[SystemId] {
        self.schedule.ids()
    }

    /// Group names, sorted.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        self.schedule.group_names()
    }

    /// Number of registered systems.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.schedule.len()
    }

    // -- Internals --

    pub(crate) fn slot(&self, id: SystemId) -> Result<&SystemSlot<G>, EcsError> {
        self.systems
            .get(id.index())
            .filter(|s| !s.retired)
            .ok_or(EcsError::UnknownSystem(id))
    }

    pub(crate) fn slot_mut(&mut self, id: SystemId) -> Result<&mut SystemSlot<G>, EcsError> {
        self.systems
            .get_mut(id.index())
            .filter(|s| !s.retired)
            .ok_or(EcsError::UnknownSystem(id))
    }

    /// The record of an entity that may still be mutated.
    fn live_record(&mut self, entity: Entity) -> Result<&mut EntityRecord, EcsError> {
        match self.entities.get_mut(&entity) {
            Some(record) if !record.despawning => Ok(record),
            _ => Err(EcsError::StaleEntity(entity)),
        }
    }

    pub(crate) fn hook_error(&self, id: SystemId, hook: HookKind, source: anyhow::Error) -> EcsError {
        EcsError::Hook {
            system: self
                .systems
                .get(id.index())
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            hook,
            source,
        }
    }
}

impl<G: 'static> Default for World<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G> fmt::Debug for World<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("components", &self.components.len())
            .field("entities", &self.entities.len())
            .field("systems", &self.systems.len())
            .finish_non_exhaustive()
    }
}

/// Chained mutation of one entity, from [`World::entity_mut`].
///
/// ```rust
/// use engine_component::args;
/// use engine_ecs::World;
///
/// let mut world: World = World::new();
/// world.register_tag("name").unwrap();
/// world.register_tag("sprite").unwrap();
/// let hero = world.create_entity().unwrap();
/// world
///     .entity_mut(hero)
///     .unwrap()
///     .add("name", args!["Jack"])
///     .unwrap()
///     .add("sprite", args!["hero.png"])
///     .unwrap();
/// assert!(world.has(hero, "sprite"));
/// ```
pub struct EntityMut<'w, G: 'static> {
    world: &'w mut World<G>,
    entity: Entity,
}

impl<G: 'static> EntityMut<'_, G> {
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// # Errors
    ///
    /// As [`World::add`].
    pub fn add(&mut self, name: &str, args: Args) -> Result<&mut Self, EcsError> {
        self.world.add(self.entity, name, args)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// As [`World::remove`].
    pub fn remove(&mut self, name: &str) -> Result<&mut Self, EcsError> {
        self.world.remove(self.entity, name)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// As [`World::clear`].
    pub fn clear(&mut self) -> Result<&mut Self, EcsError> {
        self.world.clear(self.entity)?;
        Ok(self)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.world.has(self.entity, name)
    }

    #[must_use]
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.world.get(self.entity, name)
    }

    #[must_use]
    pub fn get_mut<T: Any>(&mut self, name: &str) -> Option<&mut T> {
        self.world.get_mut(self.entity, name)
    }

    /// # Errors
    ///
    /// As [`World::destroy`].
    pub fn destroy(self, trigger_lifecycle: bool) -> Result<(), EcsError> {
        self.world.destroy(self.entity, trigger_lifecycle)
    }
}
