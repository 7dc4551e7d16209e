//! Documents, attachments and listing results.

use bytes::Bytes;
use serde_json::{Map, Value};

/// A document: string keys mapped to JSON values.
pub type Document = Map<String, Value>;

/// Content type used when an attachment does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A binary payload stored next to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Declared MIME type.
    pub content_type: String,
    /// Raw bytes.
    pub data: Bytes,
}

impl Attachment {
    /// Creates an attachment with an explicit content type.
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Creates an untyped binary attachment.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(DEFAULT_CONTENT_TYPE, data)
    }

    /// Creates a JSON attachment from a serializable value.
    pub fn json<T: serde::Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::new("application/json", serde_json::to_vec(value)?))
    }

    /// Decodes a JSON attachment.
    pub fn to_json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One row of an `all_docs` listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AllDocsRow {
    /// Document id.
    pub id: String,
    /// Projected fields (`select_list`), empty when nothing was selected.
    pub value: Document,
    /// Full document when `include_docs` was requested.
    pub doc: Option<Document>,
}

impl AllDocsRow {
    /// Creates a row with no projected fields.
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: Document::new(),
            doc: None,
        }
    }
}

/// Result of an `all_docs` listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllDocsResponse {
    /// Matching rows after sort and limit.
    pub rows: Vec<AllDocsRow>,
    /// Number of rows returned.
    pub total_rows: usize,
}

impl AllDocsResponse {
    /// Builds a response from its rows.
    pub fn new(rows: Vec<AllDocsRow>) -> Self {
        let total_rows = rows.len();
        Self { rows, total_rows }
    }

    /// Iterates over the row ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.id.as_str())
    }
}
