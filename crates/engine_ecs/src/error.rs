//! Engine error types.
//!
//! Every variant is a programmer error raised at the call that broke the
//! contract. Nothing is retried and nothing is logged instead of returned.

use engine_component::{ComponentError, Entity, QueryError};

use crate::system::{HookKind, SystemId};

/// Errors returned by [`World`](crate::World) operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// Duplicate or unknown component name, or a failing constructor.
    #[error(transparent)]
    Component(#[from] ComponentError),

    /// The entity has been destroyed (or is being destroyed).
    #[error("{0} has been destroyed")]
    StaleEntity(Entity),

    /// A system descriptor was rejected at registration.
    #[error("invalid system descriptor '{system}'")]
    InvalidSystem {
        system: String,
        #[source]
        reason: DescriptorError,
    },

    /// No system with this id is registered in this world.
    #[error("unknown {0}")]
    UnknownSystem(SystemId),

    /// A user callback returned an error.
    #[error("{hook} hook of system '{system}' failed")]
    Hook {
        system: String,
        hook: HookKind,
        #[source]
        source: anyhow::Error,
    },
}

/// Why a system descriptor was rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("system name is empty")]
    EmptyName,

    #[error("a system with this name is already registered")]
    DuplicateName,

    #[error(transparent)]
    Query(#[from] QueryError),
}
