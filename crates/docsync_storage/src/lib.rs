//! # docsync storage
//!
//! Document storage contract and backends for docsync.
//!
//! Every backend implements [`DocumentStorage`]: JSON documents addressed by
//! an opaque id, binary attachments addressed by `(id, name)`, listings
//! through [`QueryOptions`], plus optional capabilities probed with
//! `has_capacity`.
//!
//! ## Design Principles
//!
//! - Backends are thin; they do not know about replication
//! - Missing documents and attachments are reported as not found, never as
//!   empty values
//! - Must be `Send + Sync` for concurrent access
//! - Backends are built from JSON descriptors through a [`StorageRegistry`]
//!   and always wrapped in a [`CheckedStorage`]
//!
//! ## Available Backends
//!
//! - [`MemoryStorage`] - in-memory documents and attachments (`"memory"`)
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::{DocumentStorage, QueryOptions, Query, StorageRegistry};
//! use serde_json::json;
//!
//! let registry = StorageRegistry::new();
//! let storage = registry.open(&json!({"type": "memory"})).unwrap();
//! let doc = json!({"title": "foo"}).as_object().cloned().unwrap();
//! storage.put("a", doc).unwrap();
//!
//! let rows = storage
//!     .all_docs(&QueryOptions::new().with_query(Query::eq("title", "foo")))
//!     .unwrap();
//! assert_eq!(rows.total_rows, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod checked;
mod document;
mod error;
mod memory;
mod query;
mod registry;

pub use backend::{supports, DocumentStorage};
pub use checked::{CheckedStorage, FrozenId, Operation, StorageHook, Target};
pub use document::{AllDocsResponse, AllDocsRow, Attachment, Document, DEFAULT_CONTENT_TYPE};
pub use error::{optional, StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use query::{LogicalOperator, Operator, Query, QueryOptions, SortOrder};
pub use registry::{StorageConstructor, StorageRegistry};
