//! # docsync replicate
//!
//! Bidirectional replication between two document storages.
//!
//! A [`ReplicateStorage`] wraps a local and a remote
//! [`DocumentStorage`](docsync_storage::DocumentStorage). Callers read and
//! write the local side; [`ReplicateStorage::repair`] reconciles both sides.
//!
//! ## Architecture
//!
//! - [`hash`]: content fingerprints over canonical JSON
//! - [`SignatureStore`]: the last agreed fingerprint per document and per
//!   attachment, kept inside one reserved document
//! - [`resolve`]: the pure decision table turning three fingerprints and a
//!   [`Bias`] into an [`Action`]
//! - [`DispatchQueue`]: bounded worker pool running per-id jobs
//! - [`ReplicateStorage`]: the repair cycle
//!
//! ## Key Invariants
//!
//! - A signature exists only for an id both sides agreed on at least once
//! - A signature is removed only when both sides lost the document
//! - A document is never deleted while the target still holds attachments
//! - Each id reaches at most one outcome per cycle
//! - The signature document is never replicated nor listed
//!
//! ## Example
//!
//! ```rust
//! use docsync_replicate::{register, ReplicateConfig, ReplicateStorage};
//! use docsync_storage::{DocumentStorage, StorageRegistry};
//! use serde_json::json;
//!
//! let registry = StorageRegistry::new();
//! register(&registry);
//!
//! let config = ReplicateConfig::new(
//!     json!({"type": "memory", "database": "phone"}),
//!     json!({"type": "memory", "database": "server"}),
//! );
//! let storage = ReplicateStorage::new(config, &registry).unwrap();
//!
//! let id = storage.post(json!({"title": "foo"}).as_object().cloned().unwrap()).unwrap();
//! let report = storage.repair().unwrap();
//! assert_eq!(report.documents_propagated, 1);
//! assert!(registry.memory_database("server").get(&id).is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attachment;
mod config;
mod dispatch;
mod documents;
mod engine;
pub mod hash;
mod report;
mod resolver;
mod signature;

pub use config::{Checks, ReplicateConfig, SIGNATURE_ID_PREFIX};
pub use dispatch::{DispatchQueue, SettledIds};
pub use engine::{register, ReplicateStorage, STORAGE_TYPE};
pub use report::{RepairReport, ReplicateStats};
pub use resolver::{resolve, Action, Bias, ConflictHandling, Direction};
pub use signature::{AttachmentSignature, Origin, SignatureRecord, SignatureStore};
