//! Membership matching: which systems an entity belongs to, and what changes
//! when its composition changes.
//!
//! Every mutation follows the same sequence:
//!
//! 1. `pre`  = systems whose matched set currently holds the entity.
//! 2. apply the mutation (the caller has already done this).
//! 3. `post` = systems whose [`QueryDescriptor`] accepts the new composition.
//! 4. `entered = post − pre`, `left = pre − post`.
//! 5. update every matched set, then fire `enter` for `entered` and `leave`
//!    for `left`, each in schedule order.
//!
//! `pre` is read from the matched sets rather than recomputed, so it reflects
//! exactly what earlier hooks were told. Batched mutations reach step 1 and 3
//! once per batch, never per component.
//!
//! Hooks run after all bookkeeping for the mutation is done. A hook that
//! mutates composition itself runs a complete nested sequence (hooks
//! included) before the outer mutation's remaining hooks fire. Hooks the
//! nested sequence made obsolete are dropped:
//!
//! - an `enter` still pending when the entity drops out again (or is
//!   destroyed) is never fired, and neither is the matching `leave`;
//! - a `leave` for a system the entity has since rejoined is not fired.
//!
//! [`QueryDescriptor`]: engine_component::QueryDescriptor

use engine_component::Entity;
use tracing::trace;

use crate::error::EcsError;
use crate::system::{HookKind, SystemId};
use crate::world::World;

/// Systems an entity joined and left in one mutation, each in schedule order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub entered: Vec<SystemId>,
    pub left: Vec<SystemId>,
}

impl Transition {
    /// Diff two membership lists. Output keeps the order of the inputs.
    #[must_use]
    pub fn between(pre: &[SystemId], post: &[SystemId]) -> Self {
        Self {
            entered: post.iter().copied().filter(|s| !pre.contains(s)).collect(),
            left: pre.iter().copied().filter(|s| !post.contains(s)).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

impl<G: 'static> World<G> {
    /// Systems whose matched set holds `entity`, in schedule order.
    pub(crate) fn member_of(&self, entity: Entity) -> Vec<SystemId> {
        self.schedule
            .ids()
            .iter()
            .copied()
            .filter(|&id| self.is_matched(id, entity))
            .collect()
    }

    /// Systems whose predicate accepts `entity`'s current composition, in
    /// schedule order. Empty for destroyed entities.
    pub(crate) fn should_match(&self, entity: Entity) -> Vec<SystemId> {
        let Some(record) = self.entities.get(&entity) else {
            return Vec::new();
        };
        if record.despawning {
            return Vec::new();
        }
        self.schedule
            .ids()
            .iter()
            .copied()
            .filter(|id| self.systems[id.index()].query.matches(&record.components))
            .collect()
    }

    /// Reconcile `entity`'s memberships with its composition and fire the
    /// resulting hooks.
    pub(crate) fn update_membership(&mut self, entity: Entity) -> Result<(), EcsError> {
        let pre = self.member_of(entity);
        let post = self.should_match(entity);
        let transition = Transition::between(&pre, &post);
        if transition.is_empty() {
            return Ok(());
        }

        for &id in &transition.entered {
            self.systems[id.index()].matched.insert(entity);
            self.pending_enter.insert((id, entity));
        }
        let owed_leave: Vec<SystemId> = transition
            .left
            .iter()
            .copied()
            .filter(|&id| self.withdraw(id, entity))
            .collect();
        trace!(
            %entity,
            entered = transition.entered.len(),
            left = transition.left.len(),
            "membership changed"
        );

        self.fire_pending_enters(&transition.entered, entity)?;
        for id in owed_leave {
            if !self.is_matched(id, entity) {
                self.fire_leave(id, entity)?;
            }
        }
        Ok(())
    }

    /// Drop `entity` from `id`'s matched set. Returns whether the system was
    /// told about the entity, i.e. whether a `leave` is owed.
    pub(crate) fn withdraw(&mut self, id: SystemId, entity: Entity) -> bool {
        self.systems[id.index()].matched.remove(&entity);
        !self.pending_enter.remove(&(id, entity))
    }

    /// Fire `enter` for each `(id, entity)` still pending, in order. After a
    /// failure the rest are no longer pending.
    pub(crate) fn fire_pending_enters(&mut self, ids: &[SystemId], entity: Entity) -> Result<(), EcsError> {
        let mut result = Ok(());
        for &id in ids {
            let pending = self.pending_enter.remove(&(id, entity));
            if result.is_ok() && pending && self.is_matched(id, entity) && self.contains(entity) {
                result = self.fire_enter(id, entity);
            }
        }
        result
    }

    /// Add every matching live entity to a freshly registered system's
    /// matched set. Returns the newcomers, ascending by id, each with its
    /// `enter` pending.
    pub(crate) fn populate(&mut self, id: SystemId) -> Vec<Entity> {
        let slot = &self.systems[id.index()];
        let joining: Vec<Entity> = self
            .entities
            .iter()
            .filter(|(e, r)| {
                !r.despawning && !slot.matched.contains(*e) && slot.query.matches(&r.components)
            })
            .map(|(&e, _)| e)
            .collect();
        self.systems[id.index()].matched.extend(joining.iter().copied());
        self.pending_enter.extend(joining.iter().map(|&e| (id, e)));
        joining
    }

    pub(crate) fn fire_enter(&mut self, id: SystemId, entity: Entity) -> Result<(), EcsError> {
        trace!(system = %id, %entity, "enter");
        let Some(hook) = self.slot(id)?.hooks.enter.clone() else {
            return Ok(());
        };
        hook(self, entity).map_err(|source| self.hook_error(id, HookKind::Enter, source))
    }

    pub(crate) fn fire_leave(&mut self, id: SystemId, entity: Entity) -> Result<(), EcsError> {
        trace!(system = %id, %entity, "leave");
        let Some(hook) = self.slot(id)?.hooks.leave.clone() else {
            return Ok(());
        };
        hook(self, entity).map_err(|source| self.hook_error(id, HookKind::Leave, source))
    }
}
