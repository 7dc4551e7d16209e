//! Configuration for the replication engine.
//!
//! A configuration deserializes from the same JSON object that describes a
//! `"replicate"` storage, so every option keeps its descriptor name.

use crate::hash::hash_value;
use crate::resolver::ConflictHandling;
use crate::signature::Origin;
use docsync_storage::{QueryOptions, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of the reserved signature document id.
pub const SIGNATURE_ID_PREFIX: &str = "_replicate_";

/// Which changes a side is checked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Checks {
    /// Ids present on the side but never synchronized.
    pub creation: bool,
    /// Synchronized ids whose content changed.
    pub modification: bool,
    /// Synchronized ids no longer present.
    pub deletion: bool,
}

impl Checks {
    /// Every check enabled.
    pub fn all() -> Self {
        Self {
            creation: true,
            modification: true,
            deletion: true,
        }
    }

    /// Returns true if at least one check is enabled.
    pub fn any(&self) -> bool {
        self.creation || self.modification || self.deletion
    }
}

/// Configuration for a replicated storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateConfig {
    /// Descriptor of the local storage.
    pub local_sub_storage: Value,
    /// Descriptor of the remote storage.
    pub remote_sub_storage: Value,
    /// Descriptor of the storage holding signatures; the local storage when absent.
    #[serde(default, alias = "signature_storage", skip_serializing_if = "Option::is_none")]
    pub signature_sub_storage: Option<Value>,
    /// Restricts which documents take part in a cycle.
    #[serde(default)]
    pub query: QueryOptions,
    /// The remote storage only accepts new documents through `post`.
    #[serde(default)]
    pub use_remote_post: bool,
    /// Concurrent document jobs.
    #[serde(default = "one")]
    pub parallel_operation_amount: usize,
    /// Concurrent attachment jobs per document.
    #[serde(default = "one")]
    pub parallel_operation_attachment_amount: usize,
    /// Policy for independent changes on both sides.
    #[serde(default)]
    pub conflict_handling: ConflictHandling,
    /// Detect local edits.
    #[serde(default = "enabled")]
    pub check_local_modification: bool,
    /// Detect local creations.
    #[serde(default = "enabled")]
    pub check_local_creation: bool,
    /// Detect local deletions.
    #[serde(default = "enabled")]
    pub check_local_deletion: bool,
    /// Detect remote edits.
    #[serde(default = "enabled")]
    pub check_remote_modification: bool,
    /// Detect remote creations.
    #[serde(default = "enabled")]
    pub check_remote_creation: bool,
    /// Detect remote deletions.
    #[serde(default = "enabled")]
    pub check_remote_deletion: bool,
    /// Detect local attachment edits.
    #[serde(default)]
    pub check_local_attachment_modification: bool,
    /// Detect local attachment creations.
    #[serde(default)]
    pub check_local_attachment_creation: bool,
    /// Detect local attachment deletions.
    #[serde(default)]
    pub check_local_attachment_deletion: bool,
    /// Detect remote attachment edits.
    #[serde(default)]
    pub check_remote_attachment_modification: bool,
    /// Detect remote attachment creations.
    #[serde(default)]
    pub check_remote_attachment_creation: bool,
    /// Detect remote attachment deletions.
    #[serde(default)]
    pub check_remote_attachment_deletion: bool,
    /// Document field already holding a fingerprint; documents are then
    /// compared through listings instead of being fetched and hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_hash_key: Option<String>,
}

fn one() -> usize {
    1
}

fn enabled() -> bool {
    true
}

impl ReplicateConfig {
    /// Creates a configuration with default options.
    pub fn new(local_sub_storage: Value, remote_sub_storage: Value) -> Self {
        Self {
            local_sub_storage,
            remote_sub_storage,
            signature_sub_storage: None,
            query: QueryOptions::default(),
            use_remote_post: false,
            parallel_operation_amount: 1,
            parallel_operation_attachment_amount: 1,
            conflict_handling: ConflictHandling::default(),
            check_local_modification: true,
            check_local_creation: true,
            check_local_deletion: true,
            check_remote_modification: true,
            check_remote_creation: true,
            check_remote_deletion: true,
            check_local_attachment_modification: false,
            check_local_attachment_creation: false,
            check_local_attachment_deletion: false,
            check_remote_attachment_modification: false,
            check_remote_attachment_creation: false,
            check_remote_attachment_deletion: false,
            signature_hash_key: None,
        }
    }

    /// Parses a configuration from a storage descriptor.
    pub fn from_value(description: &Value) -> StorageResult<Self> {
        let config: Self = serde_json::from_value(description.clone())?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option consistency.
    pub fn validate(&self) -> StorageResult<()> {
        for (name, description) in [
            ("local_sub_storage", &self.local_sub_storage),
            ("remote_sub_storage", &self.remote_sub_storage),
        ] {
            if !description.is_object() {
                return Err(StorageError::invalid_argument(format!(
                    "{name} must be a storage description object"
                )));
            }
        }
        if self.signature_hash_key.as_deref() == Some("") {
            return Err(StorageError::invalid_argument(
                "signature_hash_key must not be empty",
            ));
        }
        Ok(())
    }

    /// Sets the signature storage description.
    pub fn with_signature_sub_storage(mut self, description: Value) -> Self {
        self.signature_sub_storage = Some(description);
        self
    }

    /// Sets the synchronization scope.
    pub fn with_query(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    /// Uses the post-only flow when creating documents on the remote side.
    pub fn with_remote_post(mut self, use_remote_post: bool) -> Self {
        self.use_remote_post = use_remote_post;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_handling(mut self, handling: ConflictHandling) -> Self {
        self.conflict_handling = handling;
        self
    }

    /// Sets document and attachment parallelism.
    pub fn with_parallelism(mut self, documents: usize, attachments: usize) -> Self {
        self.parallel_operation_amount = documents;
        self.parallel_operation_attachment_amount = attachments;
        self
    }

    /// Sets the document checks of one side.
    pub fn with_checks(mut self, side: Origin, checks: Checks) -> Self {
        let (modification, creation, deletion) = match side {
            Origin::Local => (
                &mut self.check_local_modification,
                &mut self.check_local_creation,
                &mut self.check_local_deletion,
            ),
            Origin::Remote => (
                &mut self.check_remote_modification,
                &mut self.check_remote_creation,
                &mut self.check_remote_deletion,
            ),
        };
        *modification = checks.modification;
        *creation = checks.creation;
        *deletion = checks.deletion;
        self
    }

    /// Sets the attachment checks of one side.
    pub fn with_attachment_checks(mut self, side: Origin, checks: Checks) -> Self {
        let (modification, creation, deletion) = match side {
            Origin::Local => (
                &mut self.check_local_attachment_modification,
                &mut self.check_local_attachment_creation,
                &mut self.check_local_attachment_deletion,
            ),
            Origin::Remote => (
                &mut self.check_remote_attachment_modification,
                &mut self.check_remote_attachment_creation,
                &mut self.check_remote_attachment_deletion,
            ),
        };
        *modification = checks.modification;
        *creation = checks.creation;
        *deletion = checks.deletion;
        self
    }

    /// Compares documents through a fingerprint field.
    pub fn with_signature_hash_key(mut self, key: impl Into<String>) -> Self {
        self.signature_hash_key = Some(key.into());
        self
    }

    /// Document checks applied when `side` is the pass source.
    pub fn checks(&self, side: Origin) -> Checks {
        match side {
            Origin::Local => Checks {
                creation: self.check_local_creation,
                modification: self.check_local_modification,
                deletion: self.check_local_deletion,
            },
            Origin::Remote => Checks {
                creation: self.check_remote_creation,
                modification: self.check_remote_modification,
                deletion: self.check_remote_deletion,
            },
        }
    }

    /// Attachment checks applied when `side` is the pass source.
    pub fn attachment_checks(&self, side: Origin) -> Checks {
        match side {
            Origin::Local => Checks {
                creation: self.check_local_attachment_creation,
                modification: self.check_local_attachment_modification,
                deletion: self.check_local_attachment_deletion,
            },
            Origin::Remote => Checks {
                creation: self.check_remote_attachment_creation,
                modification: self.check_remote_attachment_modification,
                deletion: self.check_remote_attachment_deletion,
            },
        }
    }

    /// Returns true if any attachment check is enabled.
    pub fn checks_attachments(&self) -> bool {
        self.attachment_checks(Origin::Local).any() || self.attachment_checks(Origin::Remote).any()
    }

    /// Id of the reserved signature document.
    ///
    /// Derived from both storage descriptions and the query options, so two
    /// replications of different pairs never share signatures.
    pub fn signature_id(&self) -> StorageResult<String> {
        let scope = Value::Array(vec![
            self.local_sub_storage.clone(),
            self.remote_sub_storage.clone(),
            serde_json::to_value(&self.query)?,
        ]);
        Ok(format!("{SIGNATURE_ID_PREFIX}{}", hash_value(&scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_storage::Query;
    use serde_json::json;

    fn memory(name: &str) -> Value {
        json!({"type": "memory", "database": name})
    }

    #[test]
    fn defaults() {
        let config = ReplicateConfig::from_value(&json!({
            "local_sub_storage": memory("a"),
            "remote_sub_storage": memory("b"),
        }))
        .unwrap();
        assert_eq!(config, ReplicateConfig::new(memory("a"), memory("b")));
        assert_eq!(config.checks(Origin::Local), Checks::all());
        assert_eq!(config.checks(Origin::Remote), Checks::all());
        assert!(!config.checks_attachments());
        assert_eq!(config.parallel_operation_amount, 1);
        assert_eq!(config.conflict_handling, ConflictHandling::Raise);
    }

    #[test]
    fn parses_every_option() {
        let config = ReplicateConfig::from_value(&json!({
            "type": "replicate",
            "local_sub_storage": memory("a"),
            "remote_sub_storage": memory("b"),
            "signature_storage": memory("sig"),
            "query": {"query": {"type": "simple", "key": "kind", "operator": "=", "value": "note"}},
            "use_remote_post": true,
            "parallel_operation_amount": 4,
            "parallel_operation_attachment_amount": 2,
            "conflict_handling": 3,
            "check_local_deletion": false,
            "check_remote_attachment_creation": true,
            "signature_hash_key": "_hash",
        }))
        .unwrap();

        assert_eq!(config.signature_sub_storage, Some(memory("sig")));
        assert_eq!(config.query.query, Some(Query::eq("kind", "note")));
        assert!(config.use_remote_post);
        assert_eq!(config.parallel_operation_amount, 4);
        assert_eq!(config.parallel_operation_attachment_amount, 2);
        assert_eq!(config.conflict_handling, ConflictHandling::Continue);
        assert!(!config.checks(Origin::Local).deletion);
        assert!(config.checks(Origin::Local).creation);
        assert!(config.attachment_checks(Origin::Remote).creation);
        assert!(!config.attachment_checks(Origin::Local).any());
        assert_eq!(config.signature_hash_key.as_deref(), Some("_hash"));
    }

    #[test]
    fn rejects_unknown_conflict_handling() {
        let result = ReplicateConfig::from_value(&json!({
            "local_sub_storage": memory("a"),
            "remote_sub_storage": memory("b"),
            "conflict_handling": 4,
        }));
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[test]
    fn rejects_missing_or_malformed_storages() {
        assert!(ReplicateConfig::from_value(&json!({"local_sub_storage": memory("a")})).is_err());
        assert!(matches!(
            ReplicateConfig::from_value(&json!({
                "local_sub_storage": "memory",
                "remote_sub_storage": memory("b"),
            })),
            Err(StorageError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn builders() {
        let config = ReplicateConfig::new(memory("a"), memory("b"))
            .with_remote_post(true)
            .with_parallelism(3, 2)
            .with_conflict_handling(ConflictHandling::KeepRemote)
            .with_checks(
                Origin::Remote,
                Checks {
                    deletion: false,
                    ..Checks::all()
                },
            )
            .with_attachment_checks(Origin::Local, Checks::all())
            .with_signature_hash_key("_hash");

        assert!(config.use_remote_post);
        assert_eq!(config.parallel_operation_amount, 3);
        assert_eq!(config.parallel_operation_attachment_amount, 2);
        assert!(!config.check_remote_deletion);
        assert!(config.check_remote_creation);
        assert!(config.check_local_attachment_deletion);
        assert!(config.checks_attachments());
        assert!(config.validate().is_ok());
        assert!(config
            .with_signature_hash_key("")
            .validate()
            .is_err());
    }

    #[test]
    fn signature_id_depends_on_scope() {
        let base = ReplicateConfig::new(memory("a"), memory("b"));
        let id = base.signature_id().unwrap();
        assert!(id.starts_with(SIGNATURE_ID_PREFIX));
        assert_eq!(id, base.clone().with_remote_post(true).signature_id().unwrap());

        let swapped = ReplicateConfig::new(memory("b"), memory("a"));
        assert_ne!(id, swapped.signature_id().unwrap());

        let scoped = base
            .clone()
            .with_query(QueryOptions::new().with_query(Query::eq("kind", "note")));
        assert_ne!(id, scoped.signature_id().unwrap());
    }
}
