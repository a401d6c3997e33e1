//! Capture-to-scope resolution.
//!
//! A query capture becomes a scope boundary pair only after the
//! [`ScopeResolver`] has adjusted its range, checked its predicates, and
//! arbitrated it against earlier claims on the same range. Scope names are
//! interned in a [`ScopeRegistry`] so boundaries carry small copyable ids.

mod adjust;
mod node_path;
mod predicates;
mod resolver;
mod settings;

use std::collections::HashMap;
use std::fmt;

pub(crate) use node_path::{resolve_anchor, resolve_position};
pub(crate) use resolver::{ResolveContext, ScopeResolver};
pub(crate) use settings::{Capture, EMPTY_SETTINGS, PatternSettings, settings_for_pattern};

/// Interned identifier of a scope name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// Raw numeric value of the id.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bidirectional map between scope names and [`ScopeId`]s.
///
/// Ids are handed out in first-seen order and never reused, so an id stays
/// valid for as long as the registry lives.
#[derive(Debug, Default, Clone)]
pub struct ScopeRegistry {
    names: Vec<String>,
    ids: HashMap<String, ScopeId>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, interning it on first use.
    pub fn id_for_scope(&mut self, name: &str) -> ScopeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = ScopeId(u32::try_from(self.names.len()).unwrap_or(u32::MAX));
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Returns the id already assigned to `name`.
    #[must_use]
    pub fn existing_id(&self, name: &str) -> Option<ScopeId> {
        self.ids.get(name).copied()
    }

    /// Returns the name behind `id`.
    #[must_use]
    pub fn scope_for_id(&self, id: ScopeId) -> Option<&str> {
        usize::try_from(id.0)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
    }

    /// Resolves a list of ids to names, skipping unknown ids.
    #[must_use]
    pub fn names_for(&self, ids: &[ScopeId]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.scope_for_id(*id))
            .map(str::to_owned)
            .collect()
    }

    /// Number of interned names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether nothing has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut registry = ScopeRegistry::new();
        let comment = registry.id_for_scope("comment.line");
        let string = registry.id_for_scope("string.quoted");
        assert_ne!(comment, string);
        assert_eq!(registry.id_for_scope("comment.line"), comment);
        assert_eq!(registry.scope_for_id(string), Some("string.quoted"));
        assert_eq!(registry.existing_id("missing"), None);
        assert_eq!(registry.len(), 2);
    }
}
