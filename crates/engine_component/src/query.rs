//! Query descriptors: which components a system requires and which it forbids.
//!
//! A [`QueryDescriptor`] is the pure membership predicate of the engine:
//!
//! ```text
//! matches(E) = has ⊆ components(E)  ∧  not ∩ components(E) = ∅
//! ```
//!
//! An empty descriptor matches every entity, including one with no
//! components at all.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Anything that can answer "is this component present?".
pub trait ComponentSet {
    fn contains_component(&self, name: &str) -> bool;
}

impl<V> ComponentSet for HashMap<String, V> {
    fn contains_component(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl<V> ComponentSet for BTreeMap<String, V> {
    fn contains_component(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl ComponentSet for HashSet<String> {
    fn contains_component(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl ComponentSet for BTreeSet<String> {
    fn contains_component(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl ComponentSet for [&str] {
    fn contains_component(&self, name: &str) -> bool {
        self.contains(&name)
    }
}

/// Required (`has`) and forbidden (`not`) component names.
///
/// `has` keeps its declaration order: per-entity callbacks that receive
/// component data get it in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub has: Vec<String>,
    pub not: Vec<String>,
}

impl QueryDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a component.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.has.push(name.into());
        self
    }

    /// Forbid a component.
    #[must_use]
    pub fn without(mut self, name: impl Into<String>) -> Self {
        self.not.push(name.into());
        self
    }

    /// `true` when neither list names anything, i.e. every entity matches.
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.has.is_empty() && self.not.is_empty()
    }

    /// Evaluate the predicate against a set of present component names.
    #[must_use]
    pub fn matches<S: ComponentSet + ?Sized>(&self, components: &S) -> bool {
        self.has.iter().all(|c| components.contains_component(c))
            && !self.not.iter().any(|c| components.contains_component(c))
    }

    /// Reject declarations that are malformed or can never match.
    ///
    /// # Errors
    ///
    /// [`QueryError::EmptyName`], [`QueryError::Repeated`] or
    /// [`QueryError::Overlap`].
    pub fn validate(&self) -> Result<(), QueryError> {
        unique_names(&self.has)?;
        let not = unique_names(&self.not)?;
        if let Some(name) = self.has.iter().find(|name| not.contains(name.as_str())) {
            return Err(QueryError::Overlap(name.clone()));
        }
        Ok(())
    }
}

fn unique_names(names: &[String]) -> Result<HashSet<&str>, QueryError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if name.is_empty() {
            return Err(QueryError::EmptyName);
        }
        if !seen.insert(name.as_str()) {
            return Err(QueryError::Repeated(name.clone()));
        }
    }
    Ok(seen)
}
