//! # docsync Testkit
//!
//! Test utilities for docsync.
//!
//! This crate provides:
//! - Replica pair fixtures over in-memory storages
//! - A write-counting storage hook
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust
//! use docsync_testkit::prelude::*;
//! use docsync_storage::DocumentStorage;
//! use serde_json::json;
//!
//! let pair = ReplicaPair::new();
//! pair.local.put("a", doc(json!({"title": "foo"}))).unwrap();
//! pair.storage.repair().unwrap();
//! assert!(pair.remote.get("a").is_ok());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod hooks;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::hooks::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;
pub use hooks::*;

use tracing_subscriber::EnvFilter;

/// Routes `tracing` output to the test harness.
///
/// Honours `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
