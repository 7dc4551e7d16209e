//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The document does not exist.
    #[error("cannot find document: {id}")]
    NotFound {
        /// The requested document id.
        id: String,
    },

    /// The attachment does not exist.
    #[error("cannot find attachment '{name}' of document {id}")]
    AttachmentNotFound {
        /// The document id.
        id: String,
        /// The attachment name.
        name: String,
    },

    /// The operation is not allowed on this target.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Why the operation was refused.
        message: String,
    },

    /// Both sides changed the same document (or attachment) independently.
    #[error("conflict on '{id}'{}: local {local_hash:?} != remote {remote_hash:?}", attachment_suffix(.attachment))]
    Conflict {
        /// Document id.
        id: String,
        /// Attachment name, when the conflict is on an attachment.
        attachment: Option<String>,
        /// Fingerprint on the local side of the pass.
        local_hash: Option<String>,
        /// Fingerprint on the remote side of the pass.
        remote_hash: Option<String>,
    },

    /// The backend does not implement a capability.
    #[error("capability not implemented: {capability}")]
    Unsupported {
        /// The missing capability.
        capability: String,
    },

    /// An argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend failure.
    #[error("storage backend error: {message}")]
    Backend {
        /// Backend-provided message.
        message: String,
    },
}

impl StorageError {
    /// Creates a document not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Creates an attachment not found error.
    pub fn attachment_not_found(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AttachmentNotFound {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Creates a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates an unsupported capability error.
    pub fn unsupported(capability: impl Into<String>) -> Self {
        Self::Unsupported {
            capability: capability.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true for both document and attachment not found errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound { .. } | StorageError::AttachmentNotFound { .. }
        )
    }

    /// Returns true if this is a replication conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }

    /// Returns true if a backend lacks the requested capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StorageError::Unsupported { .. })
    }
}

fn attachment_suffix(attachment: &Option<String>) -> String {
    attachment
        .as_ref()
        .map(|name| format!(" with attachment '{name}'"))
        .unwrap_or_default()
}

/// Maps a not found error to `None`, keeping every other outcome.
///
/// Replication reads "absent" as "deleted", so most callers want this.
pub fn optional<T>(result: StorageResult<T>) -> StorageResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
