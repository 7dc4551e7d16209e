//! Last-agreed fingerprints, per document and per attachment.
//!
//! The whole store lives inside ONE document of a backing storage, the
//! reserved signature id. Each record is an attachment of that document:
//!
//! ```text
//! signature/<hex(id)>                   -> {"hash": ..., "origin": "local"|"remote"}
//! attachment/<hex(id)>/<hex(name)>      -> {"hash": ...}
//! ```
//!
//! Keeping records out of the document namespace means listing the backing
//! storage only ever shows the reserved id, which replication skips.

use docsync_storage::{optional, Attachment, Document, DocumentStorage, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

const DOCUMENT_PREFIX: &str = "signature/";
const ATTACHMENT_PREFIX: &str = "attachment/";

/// Which side most recently supplied an agreed fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The local storage.
    Local,
    /// The remote storage.
    Remote,
}

impl Origin {
    /// The other side.
    pub fn opposite(self) -> Self {
        match self {
            Origin::Local => Origin::Remote,
            Origin::Remote => Origin::Local,
        }
    }
}

/// The last fingerprint both sides agreed on for a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Document fingerprint.
    pub hash: String,
    /// Side that supplied it.
    pub origin: Origin,
}

impl SignatureRecord {
    /// Creates a record.
    pub fn new(hash: impl Into<String>, origin: Origin) -> Self {
        Self {
            hash: hash.into(),
            origin,
        }
    }
}

/// The last fingerprint both sides agreed on for an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSignature {
    /// Attachment fingerprint.
    pub hash: String,
}

/// Typed signature records backed by a single reserved document.
#[derive(Clone)]
pub struct SignatureStore {
    backing: Arc<dyn DocumentStorage>,
    id: String,
}

impl SignatureStore {
    /// Creates a store living in document `id` of `backing`.
    pub fn new(backing: Arc<dyn DocumentStorage>, id: impl Into<String>) -> Self {
        Self {
            backing,
            id: id.into(),
        }
    }

    /// The reserved document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creates the backing document if it does not exist yet.
    ///
    /// Returns true if it had to be created.
    pub fn ensure(&self) -> StorageResult<bool> {
        if optional(self.backing.get(&self.id))?.is_some() {
            return Ok(false);
        }
        self.backing.put(&self.id, Document::new())?;
        tracing::debug!(id = %self.id, "created signature document");
        Ok(true)
    }

    /// Fetches the record of a document.
    pub fn get(&self, id: &str) -> StorageResult<SignatureRecord> {
        match self.backing.get_attachment(&self.id, &document_key(id)) {
            Ok(attachment) => Ok(attachment.to_json()?),
            Err(e) if e.is_not_found() => Err(StorageError::not_found(id)),
            Err(e) => Err(e),
        }
    }

    /// Stores the record of a document.
    pub fn put(&self, id: &str, record: &SignatureRecord) -> StorageResult<()> {
        self.backing
            .put_attachment(&self.id, &document_key(id), Attachment::json(record)?)
    }

    /// Drops the record of a document and every attachment record under it.
    ///
    /// Missing records are not an error.
    pub fn remove(&self, id: &str) -> StorageResult<()> {
        for name in self.all_attachments(id)? {
            self.remove_attachment(id, &name)?;
        }
        ignore_missing(self.backing.remove_attachment(&self.id, &document_key(id)))
    }

    /// Fetches the record of an attachment.
    pub fn get_attachment(&self, id: &str, name: &str) -> StorageResult<AttachmentSignature> {
        match self
            .backing
            .get_attachment(&self.id, &attachment_key(id, name))
        {
            Ok(attachment) => Ok(attachment.to_json()?),
            Err(e) if e.is_not_found() => Err(StorageError::attachment_not_found(id, name)),
            Err(e) => Err(e),
        }
    }

    /// Stores the record of an attachment.
    pub fn put_attachment(&self, id: &str, name: &str, hash: impl Into<String>) -> StorageResult<()> {
        let record = AttachmentSignature { hash: hash.into() };
        self.backing.put_attachment(
            &self.id,
            &attachment_key(id, name),
            Attachment::json(&record)?,
        )
    }

    /// Drops the record of an attachment. Missing records are not an error.
    pub fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        ignore_missing(
            self.backing
                .remove_attachment(&self.id, &attachment_key(id, name)),
        )
    }

    /// Names of the attachments recorded for a document.
    pub fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>> {
        let prefix = format!("{ATTACHMENT_PREFIX}{}/", hex::encode(id));
        Ok(self
            .backing_names()?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(decode)
            .collect())
    }

    /// Ids of every document with a record.
    pub fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .backing_names()?
            .iter()
            .filter_map(|key| key.strip_prefix(DOCUMENT_PREFIX))
            .filter_map(decode)
            .collect())
    }

    fn backing_names(&self) -> StorageResult<BTreeSet<String>> {
        Ok(optional(self.backing.all_attachments(&self.id))?.unwrap_or_default())
    }
}

impl std::fmt::Debug for SignatureStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureStore")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

fn document_key(id: &str) -> String {
    format!("{DOCUMENT_PREFIX}{}", hex::encode(id))
}

fn attachment_key(id: &str, name: &str) -> String {
    format!(
        "{ATTACHMENT_PREFIX}{}/{}",
        hex::encode(id),
        hex::encode(name)
    )
}

fn decode(encoded: &str) -> Option<String> {
    match hex::decode(encoded).ok().and_then(|b| String::from_utf8(b).ok()) {
        Some(decoded) => Some(decoded),
        None => {
            tracing::warn!(key = %encoded, "skipping undecodable signature key");
            None
        }
    }
}

fn ignore_missing(result: StorageResult<()>) -> StorageResult<()> {
    optional(result).map(|_| ())
}
