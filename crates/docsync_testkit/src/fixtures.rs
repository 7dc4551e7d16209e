//! Replica fixtures.
//!
//! A [`ReplicaPair`] is a replicated storage over two in-memory storages,
//! each wrapped with a [`WriteCounter`] so tests can assert on the writes a
//! repair cycle issued.

use crate::hooks::WriteCounter;
use docsync_replicate::{ReplicateConfig, ReplicateStorage};
use docsync_storage::{CheckedStorage, Document, DocumentStorage, MemoryStorage, StorageHook};
use serde_json::{json, Value};
use std::sync::Arc;

/// Builds a document from a JSON object literal.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// A replicated storage over two observable in-memory storages.
pub struct ReplicaPair {
    /// The engine under test.
    pub storage: ReplicateStorage,
    /// Raw local storage (also holds the signature document).
    pub local: Arc<MemoryStorage>,
    /// Raw remote storage.
    pub remote: Arc<MemoryStorage>,
    /// Writes the engine issued to the local storage.
    pub local_writes: Arc<WriteCounter>,
    /// Writes the engine issued to the remote storage.
    pub remote_writes: Arc<WriteCounter>,
}

impl ReplicaPair {
    /// Creates a pair with default options.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates a pair, letting `configure` adjust the options.
    ///
    /// The sub-storage descriptors are fixed; every other option is free.
    pub fn with_config(configure: impl FnOnce(ReplicateConfig) -> ReplicateConfig) -> Self {
        let config = configure(ReplicateConfig::new(
            json!({"type": "memory", "database": "local"}),
            json!({"type": "memory", "database": "remote"}),
        ));

        let local = Arc::new(MemoryStorage::new());
        let remote = Arc::new(MemoryStorage::new());
        let local_writes = Arc::new(WriteCounter::new());
        let remote_writes = Arc::new(WriteCounter::new());

        let storage = ReplicateStorage::from_parts(
            config,
            observed(&local, &local_writes),
            observed(&remote, &remote_writes),
            None,
        )
        .expect("Failed to build replicated storage");

        Self {
            storage,
            local,
            remote,
            local_writes,
            remote_writes,
        }
    }

    /// Total writes issued to both sides.
    pub fn writes(&self) -> usize {
        self.local_writes.count() + self.remote_writes.count()
    }

    /// Forgets the writes recorded so far.
    pub fn reset_writes(&self) {
        self.local_writes.reset();
        self.remote_writes.reset();
    }

    /// Ids stored on the local side, without the signature document.
    pub fn local_ids(&self) -> Vec<String> {
        self.ids(&*self.local)
    }

    /// Ids stored on the remote side.
    pub fn remote_ids(&self) -> Vec<String> {
        self.ids(&*self.remote)
    }

    fn ids(&self, storage: &dyn DocumentStorage) -> Vec<String> {
        storage
            .all_docs(&Default::default())
            .expect("Failed to list documents")
            .rows
            .into_iter()
            .map(|row| row.id)
            .filter(|id| id != self.storage.signature_id())
            .collect()
    }
}

impl Default for ReplicaPair {
    fn default() -> Self {
        Self::new()
    }
}

fn observed(storage: &Arc<MemoryStorage>, counter: &Arc<WriteCounter>) -> Arc<dyn DocumentStorage> {
    Arc::new(
        CheckedStorage::new(Arc::clone(storage))
            .with_shared_hook(Arc::clone(counter) as Arc<dyn StorageHook>),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_builds_objects() {
        let d = doc(json!({"a": 1}));
        assert_eq!(d.get("a"), Some(&json!(1)));
    }

    #[test]
    #[should_panic(expected = "expected a JSON object")]
    fn doc_rejects_non_objects() {
        doc(json!([1, 2]));
    }

    #[test]
    fn pair_observes_engine_writes() {
        let pair = ReplicaPair::new();
        pair.local.put("a", doc(json!({"x": 1}))).unwrap();
        // Direct writes to the raw storage bypass the counter.
        assert_eq!(pair.writes(), 0);

        pair.storage.repair().unwrap();
        assert!(pair.remote_writes.count() >= 1);
        assert_eq!(pair.local_ids(), vec!["a".to_string()]);
        assert_eq!(pair.remote_ids(), vec!["a".to_string()]);
    }
}
