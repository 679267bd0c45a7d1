//! Batch-local alias bindings (`saveAs` / `*_ref`).

use std::collections::HashMap;

use taskdesk_core::{EntityType, RefTarget};

/// What an alias was bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub entity_type: EntityType,
    pub target: RefTarget,
}

/// A bound alias that names a different kind of entity than the field expects.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("alias '{alias}' names a {actual}, expected a {expected}")]
pub struct ReferenceMismatch {
    pub alias: String,
    pub expected: EntityType,
    pub actual: EntityType,
}

/// Aliases bound so far in one batch.
///
/// An alias is visible only to actions after the one that declared it; a
/// later `saveAs` with the same name rebinds it.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    bindings: HashMap<String, Binding>,
}

impl ReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, alias: &str, entity_type: EntityType, target: RefTarget) {
        let binding = Binding {
            entity_type,
            target,
        };
        if let Some(previous) = self.bindings.insert(alias.to_string(), binding) {
            tracing::debug!(alias, previous = %previous.target, "Alias rebound");
        }
    }

    pub fn lookup(&self, alias: &str) -> Option<&Binding> {
        self.bindings.get(alias)
    }

    /// The target of a bound alias, checked against the entity type the
    /// referencing field expects. `Ok(None)` when the alias is not bound.
    pub fn lookup_as(
        &self,
        alias: &str,
        expected: EntityType,
    ) -> Result<Option<RefTarget>, ReferenceMismatch> {
        match self.lookup(alias) {
            Some(binding) if binding.entity_type != expected => Err(ReferenceMismatch {
                alias: alias.to_string(),
                expected,
                actual: binding.entity_type,
            }),
            Some(binding) => Ok(Some(binding.target.clone())),
            None => Ok(None),
        }
    }

    /// Resolve an optional alias expecting an entity of type `expected`.
    ///
    /// A bound alias wins over the literal `fallback`. An alias that is not
    /// bound (yet) is not an error: it yields the fallback, which may be `None`.
    pub fn resolve(
        &self,
        alias: Option<&str>,
        expected: EntityType,
        fallback: Option<RefTarget>,
    ) -> Result<Option<RefTarget>, ReferenceMismatch> {
        let Some(alias) = alias else {
            return Ok(fallback);
        };
        match self.lookup_as(alias, expected)? {
            Some(target) => Ok(Some(target)),
            None => {
                tracing::debug!(alias, "Alias not bound, using fallback");
                Ok(fallback)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
