//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use docsync_replicate::{ReplicateConfig, ReplicateStorage};
use docsync_storage::{Document, DocumentStorage, MemoryStorage, StorageResult};
use serde_json::{json, Value};
use std::sync::Arc;

/// Generate a document with `fields` string fields of `size` bytes each.
pub fn generate_document(fields: usize, size: usize) -> Document {
    (0..fields)
        .map(|i| (format!("field_{i:03}"), Value::String("x".repeat(size))))
        .collect()
}

/// Generate `count` documents keyed by id.
pub fn generate_documents(count: usize, fields: usize) -> Vec<(String, Document)> {
    (0..count)
        .map(|i| {
            let mut doc = generate_document(fields, 16);
            doc.insert("n".to_string(), json!(i));
            (format!("doc-{i:06}"), doc)
        })
        .collect()
}

/// A replicated storage over two fresh in-memory storages.
pub struct BenchPair {
    /// The engine.
    pub storage: ReplicateStorage,
    /// Local side.
    pub local: Arc<MemoryStorage>,
    /// Remote side.
    pub remote: Arc<MemoryStorage>,
}

impl BenchPair {
    /// Creates a pair running `workers` document jobs at once.
    pub fn new(workers: usize) -> StorageResult<Self> {
        let local = Arc::new(MemoryStorage::new());
        let remote = Arc::new(MemoryStorage::new());
        let config = ReplicateConfig::new(json!({"type": "memory"}), json!({"type": "memory"}))
            .with_parallelism(workers, 1);
        let storage = ReplicateStorage::from_parts(
            config,
            Arc::clone(&local) as Arc<dyn DocumentStorage>,
            Arc::clone(&remote) as Arc<dyn DocumentStorage>,
            None,
        )?;
        Ok(Self {
            storage,
            local,
            remote,
        })
    }

    /// Puts every document on the local side.
    pub fn seed_local(&self, docs: &[(String, Document)]) -> StorageResult<()> {
        for (id, doc) in docs {
            self.local.put(id, doc.clone())?;
        }
        Ok(())
    }
}
