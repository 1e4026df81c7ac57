use crate::di::Definition;
use crate::error::{ContainerError, Result};
use std::any::TypeId;
use std::collections::HashMap;

/// Append-only store of [`Definition`]s, keyed by identifier.
///
/// Populated during startup by a single writer; the container freezes it
/// behind an `Arc` before any resolution happens.
#[derive(Debug, Default)]
pub struct Registry {
    definitions: Vec<Definition>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: Definition) -> Result<()> {
        if self.index.contains_key(definition.id()) {
            return Err(ContainerError::DuplicateId {
                id: definition.id().to_string(),
            });
        }
        tracing::debug!(
            "Registered definition '{}' ({}, {})",
            definition.id(),
            definition.type_name(),
            definition.scope()
        );
        self.index
            .insert(definition.id().to_string(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    pub fn lookup(&self, id: &str) -> Result<&Definition> {
        self.index
            .get(id)
            .map(|&i| &self.definitions[i])
            .ok_or_else(|| ContainerError::not_found(format!("'{}'", id)))
    }

    /// Definitions obtainable as `T`, in registration order. Empty is not an error.
    pub fn find_by_type<T: ?Sized + 'static>(&self) -> Vec<&Definition> {
        self.find_by_type_id(TypeId::of::<T>())
    }

    pub fn find_by_type_id(&self, type_id: TypeId) -> Vec<&Definition> {
        self.definitions
            .iter()
            .filter(|d| d.is_assignable_to(type_id))
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Identifiers in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
