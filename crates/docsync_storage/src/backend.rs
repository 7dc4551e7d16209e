//! Storage contract definition.

use crate::document::{AllDocsResponse, Attachment, Document};
use crate::error::{StorageError, StorageResult};
use crate::query::QueryOptions;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The uniform contract every document backend implements.
///
/// Backends store documents (JSON maps keyed by an opaque id) and binary
/// attachments addressed by `(id, name)`. They are consumed polymorphically,
/// usually as `Arc<dyn DocumentStorage>`.
///
/// # Invariants
///
/// - `get` of a missing id fails with [`StorageError::NotFound`]
/// - attachments only exist on existing documents
/// - removing a document removes its attachments
/// - backends must be `Send + Sync`; the replication engine calls them from
///   several worker threads at once
///
/// # Capabilities
///
/// Optional operations report [`StorageError::Unsupported`]. Callers probe
/// with [`has_capacity`](Self::has_capacity) and fall back when the answer is
/// no (or unsupported).
pub trait DocumentStorage: Send + Sync {
    /// Fetches a document.
    fn get(&self, id: &str) -> StorageResult<Document>;

    /// Creates or replaces a document, returning its id.
    fn put(&self, id: &str, doc: Document) -> StorageResult<String>;

    /// Creates a document under a backend-chosen id.
    fn post(&self, doc: Document) -> StorageResult<String>;

    /// Removes a document and its attachments, returning its id.
    fn remove(&self, id: &str) -> StorageResult<String>;

    /// Fetches one attachment.
    fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment>;

    /// Creates or replaces an attachment of an existing document.
    fn put_attachment(&self, id: &str, name: &str, attachment: Attachment) -> StorageResult<()>;

    /// Removes an attachment.
    fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()>;

    /// Lists attachment names of an existing document.
    fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>>;

    /// Lists documents, optionally filtered, sorted, projected and limited.
    fn all_docs(&self, options: &QueryOptions) -> StorageResult<AllDocsResponse>;

    /// Fetches several documents in one call, in the order requested.
    fn bulk(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        let _ = ids;
        Err(StorageError::unsupported("bulk_get"))
    }

    /// Reports whether an optional capability is available.
    fn has_capacity(&self, name: &str) -> StorageResult<bool> {
        Err(StorageError::unsupported(name))
    }

    /// Gives the backend a chance to fix its own state.
    fn repair(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Probes a capability, reading "unsupported" as "no".
pub fn supports(storage: &dyn DocumentStorage, name: &str) -> StorageResult<bool> {
    match storage.has_capacity(name) {
        Ok(answer) => Ok(answer),
        Err(e) if e.is_unsupported() => Ok(false),
        Err(e) => Err(e),
    }
}

impl<S: DocumentStorage + ?Sized> DocumentStorage for Arc<S> {
    fn get(&self, id: &str) -> StorageResult<Document> {
        (**self).get(id)
    }

    fn put(&self, id: &str, doc: Document) -> StorageResult<String> {
        (**self).put(id, doc)
    }

    fn post(&self, doc: Document) -> StorageResult<String> {
        (**self).post(doc)
    }

    fn remove(&self, id: &str) -> StorageResult<String> {
        (**self).remove(id)
    }

    fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        (**self).get_attachment(id, name)
    }

    fn put_attachment(&self, id: &str, name: &str, attachment: Attachment) -> StorageResult<()> {
        (**self).put_attachment(id, name, attachment)
    }

    fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        (**self).remove_attachment(id, name)
    }

    fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>> {
        (**self).all_attachments(id)
    }

    fn all_docs(&self, options: &QueryOptions) -> StorageResult<AllDocsResponse> {
        (**self).all_docs(options)
    }

    fn bulk(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        (**self).bulk(ids)
    }

    fn has_capacity(&self, name: &str) -> StorageResult<bool> {
        (**self).has_capacity(name)
    }

    fn repair(&self) -> StorageResult<()> {
        (**self).repair()
    }
}
