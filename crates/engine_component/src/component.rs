//! Component descriptors and the registry that constructs instances.
//!
//! A component is any `'static` value. It is identified by a **string name**
//! registered once per world, and built on demand by the constructor stored in
//! its [`ComponentDescriptor`] from positional [`Args`].
//!
//! Components carry no behaviour; they are plain data holders downcast back to
//! their concrete type by whoever reads them.

use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::args::Args;
use crate::error::ComponentError;

/// A type-erased component instance as stored on an entity.
pub type ComponentBox = Box<dyn Any>;

/// A type-erased constructor.
pub type Constructor = Box<dyn Fn(&Args) -> anyhow::Result<ComponentBox>>;

/// The component produced for names registered without a constructor.
///
/// The first positional argument (or `null`) is kept in `value`, so a
/// "tag" component needs no data at all and a one-field component needs no
/// custom type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DefaultComponent {
    pub value: Value,
}

/// A registered component: its unique name and how to build it.
pub struct ComponentDescriptor {
    name: String,
    constructor: Constructor,
}

impl ComponentDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the constructor.
    ///
    /// # Errors
    ///
    /// Whatever the constructor returns, wrapped in [`ComponentError::Construct`].
    pub fn construct(&self, args: &Args) -> Result<ComponentBox, ComponentError> {
        (self.constructor)(args).map_err(|source| ComponentError::Construct {
            component: self.name.clone(),
            source,
        })
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// The set of component names known to a world, with their constructors.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    descriptors: HashMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with a typed constructor.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Duplicate`] if `name` is already registered; the
    /// existing descriptor is left untouched.
    pub fn register<T, F>(&mut self, name: &str, constructor: F) -> Result<(), ComponentError>
    where
        T: Any,
        F: Fn(&Args) -> anyhow::Result<T> + 'static,
    {
        let boxed: Constructor =
            Box::new(move |args| constructor(args).map(|value| Box::new(value) as ComponentBox));
        self.insert(name, boxed)
    }

    /// Register `name` with the [`DefaultComponent`] constructor.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Duplicate`] if `name` is already registered.
    pub fn register_default(&mut self, name: &str) -> Result<(), ComponentError> {
        self.register(name, |args: &Args| {
            Ok(DefaultComponent {
                value: args.clone().into_first(),
            })
        })
    }

    fn insert(&mut self, name: &str, constructor: Constructor) -> Result<(), ComponentError> {
        if self.descriptors.contains_key(name) {
            return Err(ComponentError::Duplicate(name.to_string()));
        }
        debug!(component = name, "registered component");
        self.descriptors.insert(
            name.to_string(),
            ComponentDescriptor {
                name: name.to_string(),
                constructor,
            },
        );
        Ok(())
    }

    /// Build an instance of `name` from `args`.
    ///
    /// # Errors
    ///
    /// [`ComponentError::Unknown`] for an unregistered name, or the
    /// constructor's own failure as [`ComponentError::Construct`].
    pub fn construct(&self, name: &str, args: &Args) -> Result<ComponentBox, ComponentError> {
        self.get(name)
            .ok_or_else(|| ComponentError::Unknown(name.to_string()))?
            .construct(args)
    }

    /// The descriptor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ComponentDescriptor> {
        self.descriptors.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether no component is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
