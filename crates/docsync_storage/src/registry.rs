//! Backend registry: storage descriptors to backend instances.
//!
//! A storage is described by a JSON object whose `"type"` field names its
//! backend, e.g. `{"type": "memory", "database": "inbox"}`. The registry maps
//! each type to a constructor and wraps what it builds in a
//! [`CheckedStorage`], so every backend gets the same argument checks.

use crate::backend::DocumentStorage;
use crate::checked::CheckedStorage;
use crate::error::{StorageError, StorageResult};
use crate::memory::MemoryStorage;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a backend from its descriptor.
pub type StorageConstructor =
    Arc<dyn Fn(&Value, &StorageRegistry) -> StorageResult<Arc<dyn DocumentStorage>> + Send + Sync>;

/// Maps descriptor types to backend constructors.
pub struct StorageRegistry {
    constructors: RwLock<HashMap<String, StorageConstructor>>,
    memory_databases: Mutex<HashMap<String, Arc<MemoryStorage>>>,
}

impl StorageRegistry {
    /// Creates a registry without any backend type.
    pub fn empty() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
            memory_databases: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a registry with the built-in backends (`memory`).
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("memory", |description, registry| {
            let storage: Arc<dyn DocumentStorage> =
                match description.get("database").and_then(Value::as_str) {
                    Some(name) => registry.memory_database(name),
                    None => Arc::new(MemoryStorage::new()),
                };
            Ok(storage)
        });
        registry
    }

    /// Registers (or replaces) the constructor for a backend type.
    pub fn register<F>(&self, storage_type: impl Into<String>, constructor: F)
    where
        F: Fn(&Value, &StorageRegistry) -> StorageResult<Arc<dyn DocumentStorage>>
            + Send
            + Sync
            + 'static,
    {
        let storage_type = storage_type.into();
        tracing::debug!(storage_type = %storage_type, "registering storage type");
        self.constructors
            .write()
            .insert(storage_type, Arc::new(constructor));
    }

    /// Returns true if a backend type is registered.
    pub fn is_registered(&self, storage_type: &str) -> bool {
        self.constructors.read().contains_key(storage_type)
    }

    /// Returns the named in-memory database, creating it on first use.
    pub fn memory_database(&self, name: &str) -> Arc<MemoryStorage> {
        Arc::clone(
            self.memory_databases
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryStorage::new())),
        )
    }

    /// Builds the backend described by `description`.
    pub fn open(&self, description: &Value) -> StorageResult<Arc<dyn DocumentStorage>> {
        let storage_type = description
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StorageError::invalid_argument("storage description requires a string \"type\"")
            })?;

        // Release the lock before running the constructor; nested storages
        // call back into the registry.
        let constructor = self
            .constructors
            .read()
            .get(storage_type)
            .cloned()
            .ok_or_else(|| StorageError::unsupported(format!("storage type {storage_type}")))?;

        let storage = constructor(description, self)?;
        Ok(Arc::new(CheckedStorage::new(storage)))
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.constructors.read().keys().cloned().collect();
        types.sort();
        f.debug_struct("StorageRegistry")
            .field("types", &types)
            .finish_non_exhaustive()
    }
}
