//! Argument checks and pre/post hooks around a backend.
//!
//! Every storage handed out by the [`registry`](crate::registry) is wrapped
//! in a [`CheckedStorage`]. The wrapper validates ids and attachment names,
//! then runs each registered [`StorageHook`] before the call and, when the
//! call succeeded, after it.

use crate::backend::DocumentStorage;
use crate::document::{AllDocsResponse, Attachment, Document};
use crate::error::{StorageError, StorageResult};
use crate::query::QueryOptions;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Storage operations, as seen by hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `get`
    Get,
    /// `put`
    Put,
    /// `post`
    Post,
    /// `remove`
    Remove,
    /// `get_attachment`
    GetAttachment,
    /// `put_attachment`
    PutAttachment,
    /// `remove_attachment`
    RemoveAttachment,
    /// `all_attachments`
    AllAttachments,
    /// `all_docs`
    AllDocs,
    /// `bulk`
    Bulk,
    /// `has_capacity`
    HasCapacity,
    /// `repair`
    Repair,
}

impl Operation {
    /// Returns true for operations that change stored data.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Put
                | Operation::Post
                | Operation::Remove
                | Operation::PutAttachment
                | Operation::RemoveAttachment
        )
    }

    /// Operation name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Post => "post",
            Operation::Remove => "remove",
            Operation::GetAttachment => "get_attachment",
            Operation::PutAttachment => "put_attachment",
            Operation::RemoveAttachment => "remove_attachment",
            Operation::AllAttachments => "all_attachments",
            Operation::AllDocs => "all_docs",
            Operation::Bulk => "bulk",
            Operation::HasCapacity => "has_capacity",
            Operation::Repair => "repair",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation is applied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Target<'a> {
    /// Document id, when the operation addresses one.
    pub id: Option<&'a str>,
    /// Attachment name, for attachment operations.
    pub name: Option<&'a str>,
}

impl<'a> Target<'a> {
    /// No particular document.
    pub fn none() -> Self {
        Self::default()
    }

    /// A document.
    pub fn document(id: &'a str) -> Self {
        Self {
            id: Some(id),
            name: None,
        }
    }

    /// An attachment.
    pub fn attachment(id: &'a str, name: &'a str) -> Self {
        Self {
            id: Some(id),
            name: Some(name),
        }
    }
}

/// A named pre/post condition attached to a [`CheckedStorage`].
pub trait StorageHook: Send + Sync {
    /// Runs before the wrapped call; an error aborts it.
    fn before(&self, operation: Operation, target: Target<'_>) -> StorageResult<()> {
        let _ = (operation, target);
        Ok(())
    }

    /// Runs after the wrapped call succeeded.
    fn after(&self, operation: Operation, target: Target<'_>) {
        let _ = (operation, target);
    }
}

/// Rejects every mutation of one document id with `Forbidden`.
#[derive(Debug, Clone)]
pub struct FrozenId {
    id: String,
}

impl FrozenId {
    /// Freezes `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl StorageHook for FrozenId {
    fn before(&self, operation: Operation, target: Target<'_>) -> StorageResult<()> {
        if operation.is_mutation() && target.id == Some(self.id.as_str()) {
            return Err(StorageError::forbidden(format!("{} is frozen", self.id)));
        }
        Ok(())
    }
}

/// Validating decorator around a backend.
pub struct CheckedStorage<S> {
    inner: S,
    hooks: Vec<Arc<dyn StorageHook>>,
}

impl<S: DocumentStorage> CheckedStorage<S> {
    /// Wraps a backend with argument checks only.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            hooks: Vec::new(),
        }
    }

    /// Adds a hook; hooks run in insertion order.
    pub fn with_hook(mut self, hook: impl StorageHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Adds a shared hook.
    pub fn with_shared_hook(mut self, hook: Arc<dyn StorageHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn call<T>(
        &self,
        operation: Operation,
        target: Target<'_>,
        f: impl FnOnce(&S) -> StorageResult<T>,
    ) -> StorageResult<T> {
        check_target(operation, target)?;
        for hook in &self.hooks {
            hook.before(operation, target)?;
        }
        let result = f(&self.inner)?;
        for hook in &self.hooks {
            hook.after(operation, target);
        }
        Ok(result)
    }
}

fn check_target(operation: Operation, target: Target<'_>) -> StorageResult<()> {
    if target.id.is_some_and(str::is_empty) {
        return Err(StorageError::invalid_argument(format!(
            "{operation}: document id must be a non-empty string"
        )));
    }
    if target.name.is_some_and(str::is_empty) {
        return Err(StorageError::invalid_argument(format!(
            "{operation}: attachment name must be a non-empty string"
        )));
    }
    Ok(())
}

impl<S> fmt::Debug for CheckedStorage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckedStorage")
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl<S: DocumentStorage> DocumentStorage for CheckedStorage<S> {
    fn get(&self, id: &str) -> StorageResult<Document> {
        self.call(Operation::Get, Target::document(id), |s| s.get(id))
    }

    fn put(&self, id: &str, doc: Document) -> StorageResult<String> {
        self.call(Operation::Put, Target::document(id), |s| s.put(id, doc))
    }

    fn post(&self, doc: Document) -> StorageResult<String> {
        self.call(Operation::Post, Target::none(), |s| s.post(doc))
    }

    fn remove(&self, id: &str) -> StorageResult<String> {
        self.call(Operation::Remove, Target::document(id), |s| s.remove(id))
    }

    fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.call(
            Operation::GetAttachment,
            Target::attachment(id, name),
            |s| s.get_attachment(id, name),
        )
    }

    fn put_attachment(&self, id: &str, name: &str, attachment: Attachment) -> StorageResult<()> {
        self.call(
            Operation::PutAttachment,
            Target::attachment(id, name),
            |s| s.put_attachment(id, name, attachment),
        )
    }

    fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.call(
            Operation::RemoveAttachment,
            Target::attachment(id, name),
            |s| s.remove_attachment(id, name),
        )
    }

    fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>> {
        self.call(Operation::AllAttachments, Target::document(id), |s| {
            s.all_attachments(id)
        })
    }

    fn all_docs(&self, options: &QueryOptions) -> StorageResult<AllDocsResponse> {
        self.call(Operation::AllDocs, Target::none(), |s| s.all_docs(options))
    }

    fn bulk(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        if ids.iter().any(String::is_empty) {
            return Err(StorageError::invalid_argument(
                "bulk: document id must be a non-empty string",
            ));
        }
        self.call(Operation::Bulk, Target::none(), |s| s.bulk(ids))
    }

    fn has_capacity(&self, name: &str) -> StorageResult<bool> {
        self.call(Operation::HasCapacity, Target::none(), |s| {
            s.has_capacity(name)
        })
    }

    fn repair(&self) -> StorageResult<()> {
        self.call(Operation::Repair, Target::none(), |s| s.repair())
    }
}
