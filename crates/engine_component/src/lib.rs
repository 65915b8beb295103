//! # engine_component
//!
//! The "E" and "C" of the ECS: entity identities, named components and the
//! predicate that decides which entities a system cares about.
//!
//! This crate provides:
//!
//! - [`Entity`] / [`EntityAllocator`]: monotonically increasing, never-reused identities.
//! - [`ComponentRegistry`]: unique component names mapped to constructors.
//! - [`Args`]: positional construction arguments (and the [`args!`] macro).
//! - [`QueryDescriptor`]: the `has`/`not` membership predicate.

pub mod args;
pub mod component;
pub mod entity;
pub mod error;
pub mod query;

pub use args::{ArgError, Args};
pub use component::{ComponentBox, ComponentDescriptor, ComponentRegistry, Constructor, DefaultComponent};
pub use entity::{Entity, EntityAllocator};
pub use error::{ComponentError, QueryError};
pub use query::{ComponentSet, QueryDescriptor};
pub use serde_json::Value;
