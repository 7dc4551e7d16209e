//! The replicated storage.
//!
//! [`ReplicateStorage`] behaves like its local storage for every caller
//! operation and reconciles local and remote when [`repair`] runs:
//!
//! 1. ensure the signature document exists
//! 2. repair both sub-storages
//! 3. local -> remote document pass
//! 4. remote -> local document pass
//! 5. attachment pass over every synchronized id, when enabled
//!
//! [`repair`]: ReplicateStorage::repair

use crate::attachment::AttachmentSync;
use crate::config::ReplicateConfig;
use crate::dispatch::{DispatchQueue, HeldConflict, SettledIds};
use crate::documents::DocumentPass;
use crate::report::{RepairCounters, RepairReport, ReplicateStats};
use crate::resolver::Direction;
use crate::signature::{Origin, SignatureStore};
use docsync_storage::{
    AllDocsResponse, AllDocsRow, Attachment, CheckedStorage, Document, DocumentStorage, FrozenId,
    QueryOptions, StorageError, StorageRegistry, StorageResult,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Storage type under which [`register`] installs the engine.
pub const STORAGE_TYPE: &str = "replicate";

/// Registers the `"replicate"` storage type.
///
/// The descriptor is a [`ReplicateConfig`]; sub-storages are opened through
/// the same registry.
pub fn register(registry: &StorageRegistry) {
    registry.register(STORAGE_TYPE, |description, registry| {
        let config = ReplicateConfig::from_value(description)?;
        let storage: Arc<dyn DocumentStorage> = Arc::new(ReplicateStorage::new(config, registry)?);
        Ok(storage)
    });
}

/// A local storage kept in sync with a remote one.
pub struct ReplicateStorage {
    config: ReplicateConfig,
    local: Arc<dyn DocumentStorage>,
    remote: Arc<dyn DocumentStorage>,
    // What callers see: the local storage with the signature id frozen.
    public: CheckedStorage<Arc<dyn DocumentStorage>>,
    signatures: SignatureStore,
    stats: RwLock<ReplicateStats>,
}

impl ReplicateStorage {
    /// Opens every sub-storage described by `config` through `registry`.
    pub fn new(config: ReplicateConfig, registry: &StorageRegistry) -> StorageResult<Self> {
        config.validate()?;
        let local = registry.open(&config.local_sub_storage)?;
        let remote = registry.open(&config.remote_sub_storage)?;
        let signature_backing = match &config.signature_sub_storage {
            Some(description) => Some(registry.open(description)?),
            None => None,
        };
        Self::from_parts(config, local, remote, signature_backing)
    }

    /// Builds an engine over already opened storages.
    ///
    /// Signatures are kept in `signature_backing`, or in `local` when `None`.
    pub fn from_parts(
        config: ReplicateConfig,
        local: Arc<dyn DocumentStorage>,
        remote: Arc<dyn DocumentStorage>,
        signature_backing: Option<Arc<dyn DocumentStorage>>,
    ) -> StorageResult<Self> {
        let signature_id = config.signature_id()?;
        let backing = signature_backing.unwrap_or_else(|| Arc::clone(&local));
        let public = CheckedStorage::new(Arc::clone(&local)).with_hook(FrozenId::new(&signature_id));

        tracing::debug!(signature_id = %signature_id, "replicated storage ready");
        Ok(Self {
            config,
            local,
            remote,
            public,
            signatures: SignatureStore::new(backing, signature_id),
            stats: RwLock::new(ReplicateStats::default()),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    /// Id of the reserved signature document.
    pub fn signature_id(&self) -> &str {
        self.signatures.id()
    }

    /// The signature records.
    pub fn signatures(&self) -> &SignatureStore {
        &self.signatures
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> ReplicateStats {
        self.stats.read().clone()
    }

    /// The local storage, without the signature guard.
    pub fn local(&self) -> &Arc<dyn DocumentStorage> {
        &self.local
    }

    /// The remote storage.
    pub fn remote(&self) -> &Arc<dyn DocumentStorage> {
        &self.remote
    }

    pub(crate) fn storage(&self, side: Origin) -> &dyn DocumentStorage {
        match side {
            Origin::Local => self.local.as_ref(),
            Origin::Remote => self.remote.as_ref(),
        }
    }

    /// Lists local documents, hiding the signature document.
    ///
    /// The signature document is dropped before the `(skip, count)` window
    /// applies, so pages are always full.
    pub fn build_query(&self, options: &QueryOptions) -> StorageResult<Vec<AllDocsRow>> {
        let mut unlimited = options.clone();
        let (skip, count) = unlimited.limit.take().unwrap_or((0, usize::MAX));
        let response = self.public.all_docs(&unlimited)?;
        Ok(response
            .rows
            .into_iter()
            .filter(|row| row.id != self.signatures.id())
            .skip(skip)
            .take(count)
            .collect())
    }

    /// Runs one full reconciliation cycle.
    ///
    /// A conflict fails the cycle after the batch it occurred in has drained;
    /// everything committed before stays committed.
    pub fn repair(&self) -> StorageResult<RepairReport> {
        let start = Instant::now();
        let counters = RepairCounters::default();

        let result = self
            .run_cycle(&counters)
            .map(|()| counters.finish(start.elapsed()));

        match &result {
            Ok(report) => {
                tracing::info!(
                    propagated = report.documents_propagated,
                    deleted = report.documents_deleted,
                    deferred = report.documents_deferred,
                    ignored = report.documents_ignored,
                    attachments_propagated = report.attachments_propagated,
                    attachments_deleted = report.attachments_deleted,
                    duration_ms = report.duration.as_millis() as u64,
                    "repair cycle completed"
                );
                self.stats.write().record_success(report);
            }
            Err(e) => {
                tracing::warn!(error = %e, "repair cycle failed");
                self.stats.write().record_failure(e);
            }
        }
        result
    }

    fn run_cycle(&self, counters: &RepairCounters) -> StorageResult<()> {
        self.signatures.ensure()?;
        repair_sub_storage(self.local.as_ref(), Origin::Local)?;
        repair_sub_storage(self.remote.as_ref(), Origin::Remote)?;

        let settled = SettledIds::new();
        settled.insert(self.signatures.id());
        let skipped_deletions = SettledIds::new();
        // A conflict stops its own id; everything else still runs.
        let mut held = HeldConflict::new();

        for direction in [Direction::LocalToRemote, Direction::RemoteToLocal] {
            let pass = DocumentPass::new(self, direction, &settled, &skipped_deletions, counters)?;
            held.absorb(pass.run())?;
        }

        if self.config.checks_attachments() {
            let ids = self.signatures.list()?;
            let sync = AttachmentSync::new(self, counters);
            let result = DispatchQueue::new(self.config.parallel_operation_amount).run(ids, |id| {
                match sync.sync_document(&id) {
                    // Present on one side only (a postponed deletion); its
                    // attachments wait until the document itself settles.
                    Err(StorageError::NotFound { id: missing }) if missing == id => {
                        tracing::debug!(id = %id, "skipping attachments of unsettled document");
                        Ok(())
                    }
                    other => other,
                }
            });
            held.absorb(result)?;
        }
        held.into_result()
    }
}

fn repair_sub_storage(storage: &dyn DocumentStorage, side: Origin) -> StorageResult<()> {
    match storage.repair() {
        Err(e) if e.is_unsupported() => {
            tracing::debug!(side = ?side, "sub-storage has no repair");
            Ok(())
        }
        other => other,
    }
}

/// Conflict error for a pass, with fingerprints reported per side.
pub(crate) fn conflict(
    direction: Direction,
    id: &str,
    attachment: Option<&str>,
    source_hash: Option<String>,
    destination_hash: Option<String>,
) -> StorageError {
    let (local_hash, remote_hash) = match direction {
        Direction::LocalToRemote => (source_hash, destination_hash),
        Direction::RemoteToLocal => (destination_hash, source_hash),
    };
    StorageError::Conflict {
        id: id.to_string(),
        attachment: attachment.map(str::to_string),
        local_hash,
        remote_hash,
    }
}

impl fmt::Debug for ReplicateStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicateStorage")
            .field("signature_id", &self.signatures.id())
            .field("conflict_handling", &self.config.conflict_handling)
            .finish_non_exhaustive()
    }
}

impl DocumentStorage for ReplicateStorage {
    fn get(&self, id: &str) -> StorageResult<Document> {
        self.public.get(id)
    }

    fn put(&self, id: &str, doc: Document) -> StorageResult<String> {
        self.public.put(id, doc)
    }

    fn post(&self, doc: Document) -> StorageResult<String> {
        self.public.post(doc)
    }

    fn remove(&self, id: &str) -> StorageResult<String> {
        self.public.remove(id)
    }

    fn get_attachment(&self, id: &str, name: &str) -> StorageResult<Attachment> {
        self.public.get_attachment(id, name)
    }

    fn put_attachment(&self, id: &str, name: &str, attachment: Attachment) -> StorageResult<()> {
        self.public.put_attachment(id, name, attachment)
    }

    fn remove_attachment(&self, id: &str, name: &str) -> StorageResult<()> {
        self.public.remove_attachment(id, name)
    }

    fn all_attachments(&self, id: &str) -> StorageResult<BTreeSet<String>> {
        self.public.all_attachments(id)
    }

    fn all_docs(&self, options: &QueryOptions) -> StorageResult<AllDocsResponse> {
        Ok(AllDocsResponse::new(self.build_query(options)?))
    }

    fn bulk(&self, ids: &[String]) -> StorageResult<Vec<Document>> {
        self.public.bulk(ids)
    }

    fn has_capacity(&self, name: &str) -> StorageResult<bool> {
        self.public.has_capacity(name)
    }

    fn repair(&self) -> StorageResult<()> {
        ReplicateStorage::repair(self).map(|_| ())
    }
}
