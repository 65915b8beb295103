//! System descriptors, lifecycle hooks and per-system runtime state.
//!
//! A system is declared with a [`SystemDescriptor`] builder and handed to
//! [`World::register_system`]. Every hook is optional; an absent hook is simply
//! not called.
//!
//! ## Lifecycle
//!
//! ```text
//! Unmounted ──mounted()──▶ Mounted ──populate──▶ Active ◀──▶ Running
//! ```
//!
//! `Running` lasts exactly as long as the system's own `pre`/`for_each`/`post`
//! pass. There is no terminal state: systems live as long as their world.
//!
//! Hooks are reference-counted closures so the world can clone one out of its
//! system table and call it with `&mut World` without holding a borrow on the
//! table. Because of that they are `Fn`, not `FnMut`; keep mutable closure
//! state in a `Cell`/`RefCell`.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use engine_component::{Args, Entity, QueryDescriptor};
use serde::{Deserialize, Serialize};

use crate::world::World;

/// What every hook returns. Errors abort the operation that ran the hook.
pub type HookResult = anyhow::Result<()>;

pub type MountedFn<G> = Rc<dyn Fn(&mut World<G>, SystemId) -> HookResult>;
pub type PassFn<G> = Rc<dyn Fn(&mut World<G>, SystemId, &G) -> HookResult>;
pub type EntityFn<G> = Rc<dyn Fn(&mut World<G>, Entity, &G) -> HookResult>;
pub type ComponentsFn<G> = Rc<dyn Fn(FetchedComponents<'_>, Entity, &G) -> HookResult>;
pub type TransitionFn<G> = Rc<dyn Fn(&mut World<G>, Entity) -> HookResult>;
pub type EventFn<G> = Rc<dyn Fn(&mut World<G>, SystemId, &Args) -> HookResult>;
pub type EntityEventFn<G> = Rc<dyn Fn(&mut World<G>, Entity, &Args) -> HookResult>;

/// Identifies a system within its world. Ids are assigned in registration
/// order, which is also the schedule's tiebreak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SystemId(u32);

impl SystemId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System({})", self.0)
    }
}

/// Where a system is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    /// Registered; `mounted` has not finished yet.
    Unmounted,
    /// `mounted` has run; existing entities are being matched.
    Mounted,
    /// Takes part in scheduling and events.
    Active,
    /// Inside its own `pre`/`for_each`/`post` pass.
    Running,
}

/// Names the hook that failed in an [`EcsError::Hook`](crate::EcsError::Hook).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Mounted,
    Pre,
    ForEach,
    Post,
    Enter,
    Leave,
    PreHandle,
    Event,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mounted => "mounted",
            Self::Pre => "pre",
            Self::ForEach => "for_each",
            Self::Post => "post",
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::PreHandle => "pre_handle",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// The per-entity callback, in one of two calling conventions.
pub enum ForEach<G> {
    /// Receives the world, so it may read any component and mutate
    /// composition (including destroying the entity).
    Entity(EntityFn<G>),
    /// Receives the system's `has` components, mutably and in declaration
    /// order. It cannot reach the world while holding them.
    Components(ComponentsFn<G>),
}

impl<G> Clone for ForEach<G> {
    fn clone(&self) -> Self {
        match self {
            Self::Entity(f) => Self::Entity(Rc::clone(f)),
            Self::Components(f) => Self::Components(Rc::clone(f)),
        }
    }
}

/// An event subscription handler.
pub enum EventHandler<G> {
    /// Called once per emit with the raw payload.
    Once(EventFn<G>),
    /// Called once per entity in the system's matched set.
    EachEntity(EntityEventFn<G>),
}

impl<G> EventHandler<G> {
    pub fn once(f: impl Fn(&mut World<G>, SystemId, &Args) -> HookResult + 'static) -> Self {
        Self::Once(Rc::new(f))
    }

    pub fn each_entity(f: impl Fn(&mut World<G>, Entity, &Args) -> HookResult + 'static) -> Self {
        Self::EachEntity(Rc::new(f))
    }
}

impl<G> Clone for EventHandler<G> {
    fn clone(&self) -> Self {
        match self {
            Self::Once(f) => Self::Once(Rc::clone(f)),
            Self::EachEntity(f) => Self::EachEntity(Rc::clone(f)),
        }
    }
}

pub(crate) struct Hooks<G> {
    pub(crate) mounted: Option<MountedFn<G>>,
    pub(crate) pre: Option<PassFn<G>>,
    pub(crate) for_each: Option<ForEach<G>>,
    pub(crate) post: Option<PassFn<G>>,
    pub(crate) enter: Option<TransitionFn<G>>,
    pub(crate) leave: Option<TransitionFn<G>>,
    pub(crate) pre_handle: Option<EventFn<G>>,
}

impl<G> Default for Hooks<G> {
    fn default() -> Self {
        Self {
            mounted: None,
            pre: None,
            for_each: None,
            post: None,
            enter: None,
            leave: None,
            pre_handle: None,
        }
    }
}

/// Declarative description of a system.
///
/// ```rust
/// use engine_ecs::SystemDescriptor;
///
/// let movement = SystemDescriptor::<f64>::new("movement")
///     .has(["position", "velocity"])
///     .not(["stunned"])
///     .group("model")
///     .for_each(|_world, _entity, _dt| Ok(()));
/// assert_eq!(movement.name(), "movement");
/// ```
pub struct SystemDescriptor<G> {
    pub(crate) name: String,
    pub(crate) query: QueryDescriptor,
    pub(crate) group: Option<String>,
    pub(crate) order: i32,
    pub(crate) hooks: Hooks<G>,
    pub(crate) subscriptions: Vec<(String, EventHandler<G>)>,
}

impl<G: 'static> SystemDescriptor<G> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: QueryDescriptor::new(),
            group: None,
            order: 0,
            hooks: Hooks::default(),
            subscriptions: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn query(&self) -> &QueryDescriptor {
        &self.query
    }

    /// Required components. May be called repeatedly; names accumulate.
    #[must_use]
    pub fn has<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.has.extend(names.into_iter().map(Into::into));
        self
    }

    /// Forbidden components. May be called repeatedly; names accumulate.
    #[must_use]
    pub fn not<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.not.extend(names.into_iter().map(Into::into));
        self
    }

    /// Replace the whole predicate at once.
    #[must_use]
    pub fn with_query(mut self, query: QueryDescriptor) -> Self {
        self.query = query;
        self
    }

    /// Tag the system with a group. A system belongs to at most one group;
    /// a second call replaces the first.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Schedule position: lower runs earlier. Defaults to `0`.
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn mounted(mut self, f: impl Fn(&mut World<G>, SystemId) -> HookResult + 'static) -> Self {
        self.hooks.mounted = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn pre(mut self, f: impl Fn(&mut World<G>, SystemId, &G) -> HookResult + 'static) -> Self {
        self.hooks.pre = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn for_each(
        mut self,
        f: impl Fn(&mut World<G>, Entity, &G) -> HookResult + 'static,
    ) -> Self {
        self.hooks.for_each = Some(ForEach::Entity(Rc::new(f)));
        self
    }

    #[must_use]
    pub fn for_each_components(
        mut self,
        f: impl Fn(FetchedComponents<'_>, Entity, &G) -> HookResult + 'static,
    ) -> Self {
        self.hooks.for_each = Some(ForEach::Components(Rc::new(f)));
        self
    }

    #[must_use]
    pub fn post(mut self, f: impl Fn(&mut World<G>, SystemId, &G) -> HookResult + 'static) -> Self {
        self.hooks.post = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn enter(mut self, f: impl Fn(&mut World<G>, Entity) -> HookResult + 'static) -> Self {
        self.hooks.enter = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn leave(mut self, f: impl Fn(&mut World<G>, Entity) -> HookResult + 'static) -> Self {
        self.hooks.leave = Some(Rc::new(f));
        self
    }

    /// Called before this system's handler on every event it receives.
    #[must_use]
    pub fn pre_handle(
        mut self,
        f: impl Fn(&mut World<G>, SystemId, &Args) -> HookResult + 'static,
    ) -> Self {
        self.hooks.pre_handle = Some(Rc::new(f));
        self
    }

    /// Subscribe to `event`; the handler runs once per emit.
    #[must_use]
    pub fn on(
        mut self,
        event: impl Into<String>,
        f: impl Fn(&mut World<G>, SystemId, &Args) -> HookResult + 'static,
    ) -> Self {
        self.subscriptions.push((event.into(), EventHandler::once(f)));
        self
    }

    /// Subscribe to `event`; the handler runs once per matched entity.
    #[must_use]
    pub fn on_each(
        mut self,
        event: impl Into<String>,
        f: impl Fn(&mut World<G>, Entity, &Args) -> HookResult + 'static,
    ) -> Self {
        self.subscriptions
            .push((event.into(), EventHandler::each_entity(f)));
        self
    }
}

impl<G> fmt::Debug for SystemDescriptor<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("group", &self.group)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// A registered system as stored by the world.
pub(crate) struct SystemSlot<G> {
    pub(crate) name: String,
    pub(crate) query: QueryDescriptor,
    pub(crate) group: Option<String>,
    pub(crate) order: i32,
    pub(crate) hooks: Hooks<G>,
    pub(crate) state: SystemState,
    /// Entities currently satisfying `query`, ascending by id.
    pub(crate) matched: BTreeSet<Entity>,
    /// Set when `mounted` failed; the slot only keeps later ids stable.
    pub(crate) retired: bool,
}

/// The `has` components of one entity, in declaration order, borrowed
/// mutably for a [`ForEach::Components`] callback.
pub struct FetchedComponents<'a> {
    items: Vec<&'a mut dyn Any>,
}

impl<'a> FetchedComponents<'a> {
    pub(crate) fn new(items: Vec<&'a mut dyn Any>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The component at `index`, if it is a `T`.
    #[must_use]
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.downcast_ref()
    }

    /// The component at `index`, mutably, if it is a `T`.
    #[must_use]
    pub fn get_mut<T: Any>(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)?.downcast_mut()
    }

    /// Two distinct components at once.
    #[must_use]
    pub fn pair_mut<A: Any, B: Any>(&mut self, a: usize, b: usize) -> Option<(&mut A, &mut B)> {
        if a == b || a.max(b) >= self.items.len() {
            return None;
        }
        let (low, high) = self.items.split_at_mut(a.max(b));
        let (first, second) = if a < b {
            (&mut *low[a], &mut *high[0])
        } else {
            (&mut *high[0], &mut *low[b])
        };
        Some((first.downcast_mut()?, second.downcast_mut()?))
    }
}
