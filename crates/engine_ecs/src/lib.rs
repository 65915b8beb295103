//! # engine_ecs
//!
//! The runtime half of the ECS: a [`World`] owns entities and their
//! components, keeps every system's matched-entity set in step with entity
//! composition, runs systems in priority order and dispatches named events.
//!
//! Everything is single-threaded and synchronous. Hooks run on the caller's
//! stack and may mutate the world they are handed; the matching engine and
//! scheduler are written to stay consistent under that re-entrancy.
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use engine_component::{Args, args};
//! use engine_ecs::{SystemDescriptor, World};
//!
//! let mut world: World<f64> = World::new();
//! world
//!     .register_component("position", |a: &Args| Ok([a.f64_or(0, 0.0)?, a.f64_or(1, 0.0)?]))
//!     .unwrap();
//!
//! let entered = Rc::new(Cell::new(0));
//! let counter = Rc::clone(&entered);
//! let drift = world
//!     .register_system(
//!         SystemDescriptor::new("drift")
//!             .has(["position"])
//!             .enter(move |_, _| {
//!                 counter.set(counter.get() + 1);
//!                 Ok(())
//!             })
//!             .for_each(|world, entity, dt| {
//!                 if let Some(p) = world.get_mut::<[f64; 2]>(entity, "position") {
//!                     p[0] += dt;
//!                 }
//!                 Ok(())
//!             }),
//!     )
//!     .unwrap();
//!
//! let e = world.create_entity().unwrap();
//! world.add(e, "position", args![1, 2]).unwrap();
//! world.run(&0.5).unwrap();
//!
//! assert_eq!(entered.get(), 1);
//! assert!(world.is_matched(drift, e));
//! assert_eq!(world.get::<[f64; 2]>(e, "position"), Some(&[1.5, 2.0]));
//! ```

pub mod error;
pub mod events;
pub mod matching;
pub mod scheduler;
pub mod system;
pub mod world;

pub use error::{DescriptorError, EcsError};
pub use events::EventBus;
pub use matching::Transition;
pub use scheduler::Schedule;
pub use system::{
    EventHandler, FetchedComponents, ForEach, HookKind, HookResult, SystemDescriptor, SystemId,
    SystemState,
};
pub use world::{EntityMut, World};
