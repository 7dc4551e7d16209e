//! In-memory document backend.

use crate::backend::DocumentStorage;
use crate::document::{AllDocsResponse, Attachment, Document};
use crate::error::{StorageError, StorageResult};
use crate::query::QueryOptions;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

/// Capabilities answered with `true` by [`MemoryStorage::has_capacity`].
const CAPACITIES: &[&str] = &[
    "list", "query", "select", "sort", "limit", "include", "bulk_get",
];

#[derive(Debug, Clone, Default)]
struct Entry {
    doc: Document,
    attachments: BTreeMap<String, Attachment>,
}

/// A document backend that keeps everything in memory.
///
/// Suitable for tests, caches and as the reference implementation of the
/// storage contract. Queries are evaluated in memory with
/// [`QueryOptions::apply`].
///
/// # Thread Safety
///
/// All operations take an internal read/write lock for their own duration
/// only, so the backend can be shared across threads.
///
/// # Example
///
/// ```rust
/// use docsync_storage::{DocumentStorage, MemoryStorage};
/// use serde_json::json;
///
/// let storage = MemoryStorage::new();
/// let doc = json!({"title": "foo"}).as_object().cloned().unwrap();
/// let id = storage.post(doc).unwrap();
/// assert_eq!(storage.get(&id).unwrap()["title"], "foo");
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryStorage {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no document is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Removes every document and attachment.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl DocumentStorage for MemoryStorage {
    fn get(&self, id: &str) -> StorageResult<Document> {
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.doc.clone())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn put(&self, id: &str, doc: Document) -> StorageResult<String> {
        // Replacing a document keeps its attachments.
        self.entries
            .write()
            .entry(id.to_string())
            .or_default()
            .doc = doc;
        Ok(id.to_string())
    }

    fn post(&self, doc: Document) -> StorageResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.entries.write().insert(
            id.clone(),
            Entry {
                doc,
                attachments: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    fn remove(&self, id: &str) -> StorageResult<String> {
        self.entries
            .write()
            .remove(id)
            .map(|_| id.to_string())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        let entries = self.entries.read();
        let entry = entries.get(id).ok_or_else(|| StorageError::not_found(id))?;
        entry
            .attachments
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::attachment_not_found(id, name))
    }

    fn put_attachment(&self, id: &str, name: &str, attachment: Attachment) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        entry.attachments.insert(name.to_string(), attachment);
        Ok(())
    }

    fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| StorageError::not_found(id))?;
        entry
            .attachments
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::attachment_not_found(id, name))
    }

    fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>> {
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.attachments.keys().cloned().collect())
            .ok_or_else(|| StorageError::not_found(id))
    }

    fn all_docs(&self, options: &QueryOptions) -> StorageResult<AllDocsResponse> {
        let entries = self.entries.read();
        Ok(options.apply(entries.iter().map(|(id, entry)| (id.as_str(), &entry.doc))))
    }

    fn bulk(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        let entries = self.entries.read();
        ids.iter()
            .map(|id| {
                entries
                    .get(id)
                    .map(|entry| entry.doc.clone())
                    .ok_or_else(|| StorageError::not_found(id.as_str()))
            })
            .collect()
    }

    fn has_capacity(&self, name: &str) -> StorageResult<bool> {
        Ok(CAPACITIES.contains(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn memory_new_is_empty() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn memory_put_and_get() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.put("a", doc(json!({"x": 1}))).unwrap(), "a");
        assert_eq!(storage.get("a").unwrap(), doc(json!({"x": 1})));
    }

    #[test]
    fn memory_get_missing_is_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.get("missing"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn memory_post_generates_unique_ids() {
        let storage = MemoryStorage::new();
        let a = storage.post(doc(json!({}))).unwrap();
        let b = storage.post(doc(json!({}))).unwrap();
        assert_ne!(a, b);
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn memory_put_keeps_attachments() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({"v": 1}))).unwrap();
        storage
            .put_attachment("a", "img", Attachment::binary(vec![1u8]))
            .unwrap();
        storage.put("a", doc(json!({"v": 2}))).unwrap();
        assert_eq!(
            storage.all_attachments("a").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["img".to_string()]
        );
    }

    #[test]
    fn memory_remove_drops_attachments() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({}))).unwrap();
        storage
            .put_attachment("a", "img", Attachment::binary(vec![1u8]))
            .unwrap();
        storage.remove("a").unwrap();
        assert!(storage.all_attachments("a").unwrap_err().is_not_found());
        assert!(storage.remove("a").unwrap_err().is_not_found());
    }

    #[test]
    fn memory_attachment_requires_document() {
        let storage = MemoryStorage::new();
        let result = storage.put_attachment("nope", "img", Attachment::binary(vec![1u8]));
        assert!(matches!(result, Err(StorageError::NotFound { .. })));
    }

    #[test]
    fn memory_attachment_lifecycle() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({}))).unwrap();
        storage
            .put_attachment("a", "img", Attachment::new("image/png", vec![9u8, 9]))
            .unwrap();
        let attachment = storage.get_attachment("a", "img").unwrap();
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(&attachment.data[..], &[9u8, 9]);

        storage.remove_attachment("a", "img").unwrap();
        assert!(matches!(
            storage.get_attachment("a", "img"),
            Err(StorageError::AttachmentNotFound { .. })
        ));
        assert!(storage.remove_attachment("a", "img").is_err());
    }

    #[test]
    fn memory_all_docs_with_query() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({"type": "note"}))).unwrap();
        storage.put("b", doc(json!({"type": "task"}))).unwrap();
        let response = storage
            .all_docs(&QueryOptions::new().with_query(Query::eq("type", "task")))
            .unwrap();
        assert_eq!(response.ids().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn memory_bulk_preserves_order() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({"n": 1}))).unwrap();
        storage.put("b", doc(json!({"n": 2}))).unwrap();
        let docs = storage.bulk(&["b".into(), "a".into()]).unwrap();
        assert_eq!(docs[0]["n"], 2);
        assert_eq!(docs[1]["n"], 1);
        assert!(storage.bulk(&["zz".into()]).is_err());
    }

    #[test]
    fn memory_capacities() {
        let storage = MemoryStorage::new();
        assert!(storage.has_capacity("bulk_get").unwrap());
        assert!(storage.has_capacity("query").unwrap());
        assert!(!storage.has_capacity("teleport").unwrap());
    }

    #[test]
    fn memory_clear() {
        let storage = MemoryStorage::new();
        storage.put("a", doc(json!({}))).unwrap();
        storage.clear();
        assert!(storage.is_empty());
    }
}
