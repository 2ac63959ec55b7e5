// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Registry of validated type descriptors.
//!
//! Descriptors are validated once when registered and then shared read-only
//! by every codec created for that type.

use super::error::{CodecError, Result};
use crate::encoding::cdr::TypeDescriptor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe registry for type descriptors.
///
/// Uses RwLock for concurrent read access with exclusive write access.
/// Lookups hand out `Arc` clones, so the lock is never held while encoding.
pub struct TypeRegistry {
    inner: RwLock<TypeRegistryInner>,
}

struct TypeRegistryInner {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Create a new empty type registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TypeRegistryInner {
                types: HashMap::new(),
            }),
        }
    }

    /// Register a descriptor under its own type name, replacing any previous one.
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<Arc<TypeDescriptor>> {
        let descriptor = Arc::new(descriptor);
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        inner
            .types
            .insert(descriptor.name().to_string(), Arc::clone(&descriptor));
        tracing::debug!(type_name = descriptor.name(), ops = descriptor.ops().len(), "registered type");
        Ok(descriptor)
    }

    /// Parse a JSON descriptor document and register it.
    pub fn register_json(&self, json: &str) -> Result<Arc<TypeDescriptor>> {
        self.register(TypeDescriptor::from_json(json)?)
    }

    /// Get a descriptor by name.
    pub fn get(&self, name: &str) -> Result<Arc<TypeDescriptor>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        inner
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| CodecError::type_not_found(name))
    }

    /// Check if a type is registered.
    pub fn contains(&self, name: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        Ok(inner.types.contains_key(name))
    }

    /// Get all registered type names.
    pub fn names(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        Ok(inner.types.keys().cloned().collect())
    }

    /// Remove a type from the registry.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        Ok(inner.types.remove(name).is_some())
    }

    /// Get the number of registered types.
    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CodecError::Other(format!("Registry lock poisoned: {e}")))?;
        Ok(inner.types.len())
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
