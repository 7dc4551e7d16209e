//! One directional document pass.
//!
//! The pass source is listed and compared against the signature list:
//!
//! - listed, no signature: creation candidate
//! - listed, signature: modification candidate
//! - signature, not listed: deletion candidate
//!
//! Each candidate becomes one job. A job reads the fingerprints it needs,
//! asks [`resolve`] what to do and applies the answer to exactly one side,
//! then updates the signature and settles the id.

use crate::attachment::AttachmentSync;
use crate::config::Checks;
use crate::dispatch::{DispatchQueue, HeldConflict, SettledIds};
use crate::engine::{conflict, ReplicateStorage};
use crate::hash::{canonicalize_value, hash_document};
use crate::report::{Outcome, RepairCounters};
use crate::resolver::{resolve, Action, Bias, Direction};
use crate::signature::{Origin, SignatureRecord};
use docsync_storage::{
    optional, supports, Document, DocumentStorage, QueryOptions, StorageError, StorageResult,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const BULK_CAPABILITY: &str = "bulk_get";

/// A listed id worth comparing.
struct Candidate {
    id: String,
    is_modification: bool,
    // Fingerprint read from the listing, in hash-key mode.
    listed_hash: Option<String>,
}

pub(crate) struct DocumentPass<'a> {
    engine: &'a ReplicateStorage,
    direction: Direction,
    bias: Bias,
    checks: Checks,
    settled: &'a SettledIds,
    skipped_deletions: &'a SettledIds,
    counters: &'a RepairCounters,
    // Destination fingerprints by id, in hash-key mode.
    destination_hashes: Option<HashMap<String, String>>,
}

impl<'a> DocumentPass<'a> {
    pub(crate) fn new(
        engine: &'a ReplicateStorage,
        direction: Direction,
        settled: &'a SettledIds,
        skipped_deletions: &'a SettledIds,
        counters: &'a RepairCounters,
    ) -> StorageResult<Self> {
        let config = engine.config();
        let destination_hashes = match &config.signature_hash_key {
            Some(key) => Some(list_hashes(engine.storage(direction.destination()), key)?),
            None => None,
        };
        Ok(Self {
            engine,
            direction,
            bias: Bias::new(config.conflict_handling, direction),
            checks: config.checks(direction.source()),
            settled,
            skipped_deletions,
            counters,
            destination_hashes,
        })
    }

    fn source(&self) -> &'a dyn DocumentStorage {
        self.engine.storage(self.direction.source())
    }

    fn destination(&self) -> &'a dyn DocumentStorage {
        self.engine.storage(self.direction.destination())
    }

    pub(crate) fn run(&self) -> StorageResult<()> {
        let config = self.engine.config();
        let hash_key = config.signature_hash_key.as_deref();
        let listing = match hash_key {
            Some(key) => self
                .source()
                .all_docs(&config.query.clone().with_select_list([key]))?,
            None => self.source().all_docs(&config.query)?,
        };
        let signed = self.engine.signatures().list()?;
        let signed_ids: HashSet<&str> = signed.iter().map(String::as_str).collect();

        let mut listed = HashSet::with_capacity(listing.rows.len());
        let mut candidates = Vec::new();
        for row in listing.rows {
            let is_modification = signed_ids.contains(row.id.as_str());
            let checked = if is_modification {
                self.checks.modification
            } else {
                self.checks.creation
            };
            if checked && !self.settled.contains(&row.id) {
                candidates.push(Candidate {
                    id: row.id.clone(),
                    is_modification,
                    listed_hash: hash_key.and_then(|key| listed_hash(&row.value, key)),
                });
            }
            listed.insert(row.id);
        }

        tracing::debug!(
            direction = %self.direction,
            listed = listed.len(),
            candidates = candidates.len(),
            "diffing documents"
        );

        let queue = DispatchQueue::new(config.parallel_operation_amount);
        let bulk = hash_key.is_none()
            && self.direction == Direction::RemoteToLocal
            && supports(self.source(), BULK_CAPABILITY)?;
        let mut held = HeldConflict::new();
        held.absorb(if bulk {
            self.check_bulk(candidates, queue)
        } else {
            queue.run(candidates, |candidate| self.check_candidate(candidate))
        })?;

        let mut deletions = Vec::new();
        for id in signed {
            if listed.contains(&id) || self.settled.contains(&id) || self.skipped_deletions.contains(&id)
            {
                continue;
            }
            if self.checks.deletion {
                deletions.push(id);
            } else {
                self.skipped_deletions.insert(id);
            }
        }
        held.absorb(queue.run(deletions, |id| self.check_deletion(&id)))?;
        held.into_result()
    }

    /// Fetches every candidate with one call, then compares them in order.
    fn check_bulk(&self, candidates: Vec<Candidate>, queue: DispatchQueue) -> StorageResult<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let docs = match self.source().bulk(&ids) {
            Ok(docs) if docs.len() == ids.len() => docs,
            Ok(docs) => {
                return Err(StorageError::backend(format!(
                    "bulk fetch returned {} documents for {} ids",
                    docs.len(),
                    ids.len()
                )))
            }
            // A document vanished since listing, or bulk is not there after all.
            Err(e) if e.is_not_found() || e.is_unsupported() => {
                tracing::debug!(error = %e, "bulk fetch failed, fetching documents one by one");
                return queue.run(candidates, |candidate| self.check_candidate(candidate));
            }
            Err(e) => return Err(e),
        };

        DispatchQueue::new(1).run(candidates.into_iter().zip(docs), |(candidate, doc)| {
            let hash = hash_document(&doc);
            self.check_signature_difference(candidate, Some(hash), Some(doc))
        })
    }

    fn check_candidate(&self, candidate: Candidate) -> StorageResult<()> {
        if self.settled.contains(&candidate.id) {
            return Ok(());
        }
        let (hash, doc) = match &candidate.listed_hash {
            Some(hash) => (Some(hash.clone()), None),
            None => fetch(self.source(), &candidate.id)?,
        };
        self.check_signature_difference(candidate, hash, doc)
    }

    fn check_signature_difference(
        &self,
        candidate: Candidate,
        source_hash: Option<String>,
        source_doc: Option<Document>,
    ) -> StorageResult<()> {
        let status = if candidate.is_modification {
            self.status(&candidate.id)?
        } else {
            None
        };
        if source_hash == status {
            return Ok(());
        }
        self.check_and_propagate(&candidate.id, source_hash, source_doc, status)
    }

    fn check_deletion(&self, id: &str) -> StorageResult<()> {
        let status = self.status(id)?;
        self.check_and_propagate(id, None, None, status)
    }

    fn status(&self, id: &str) -> StorageResult<Option<String>> {
        Ok(optional(self.engine.signatures().get(id))?.map(|record| record.hash))
    }

    fn destination_state(&self, id: &str) -> StorageResult<(Option<String>, Option<Document>)> {
        match &self.destination_hashes {
            Some(hashes) => Ok((hashes.get(id).cloned(), None)),
            None => fetch(self.destination(), id),
        }
    }

    fn check_and_propagate(
        &self,
        id: &str,
        source_hash: Option<String>,
        source_doc: Option<Document>,
        status: Option<String>,
    ) -> StorageResult<()> {
        let (destination_hash, destination_doc) = self.destination_state(id)?;
        let action = resolve(
            source_hash.as_deref(),
            destination_hash.as_deref(),
            status.as_deref(),
            self.bias,
        );
        tracing::debug!(id, action = %action, direction = %self.direction, "resolved document");

        let source_side = self.direction.source();
        let destination_side = self.direction.destination();
        match action {
            Action::NoOp => {
                let signatures = self.engine.signatures();
                match source_hash {
                    Some(hash) => signatures.put(id, &SignatureRecord::new(hash, source_side))?,
                    None => signatures.remove(id)?,
                }
                self.settled.insert(id);
                Ok(())
            }
            Action::PropagateToDestination => self.propagate_modification(
                source_side,
                id,
                source_doc,
                source_hash,
                destination_hash.is_some(),
            ),
            Action::DeleteOnDestination => self.propagate_deletion(destination_side, id),
            Action::Ignore => {
                self.counters.record(Outcome::DocumentIgnored);
                Ok(())
            }
            Action::PropagateToSource => self.propagate_modification(
                destination_side,
                id,
                destination_doc,
                destination_hash,
                source_hash.is_some(),
            ),
            Action::DeleteOnSource => self.propagate_deletion(source_side, id),
            Action::RaiseConflict => Err(conflict(
                self.direction,
                id,
                None,
                source_hash,
                destination_hash,
            )),
        }
    }

    /// Copies a document from side `from` to the other side.
    fn propagate_modification(
        &self,
        from: Origin,
        id: &str,
        doc: Option<Document>,
        hash: Option<String>,
        target_exists: bool,
    ) -> StorageResult<()> {
        let Some(hash) = hash else {
            return Err(StorageError::backend(format!(
                "cannot propagate absent document {id}"
            )));
        };
        let doc = match doc {
            Some(doc) => doc,
            None => self.engine.storage(from).get(id)?,
        };

        let target = from.opposite();
        if target == Origin::Remote && !target_exists && self.engine.config().use_remote_post {
            return self.post_to_remote(id, doc, hash);
        }

        self.engine.storage(target).put(id, doc)?;
        self.engine
            .signatures()
            .put(id, &SignatureRecord::new(hash, from))?;
        self.settled.insert(id);
        self.counters.record(Outcome::DocumentPropagated);
        Ok(())
    }

    /// Creates a local document on a remote that assigns its own ids, then
    /// moves the local copy (attachments included) under the new id.
    fn post_to_remote(&self, id: &str, doc: Document, hash: String) -> StorageResult<()> {
        let local = self.engine.storage(Origin::Local);
        let signatures = self.engine.signatures();

        let new_id = self.engine.storage(Origin::Remote).post(doc.clone())?;
        local.put(&new_id, doc)?;
        for name in optional(local.all_attachments(id))?.unwrap_or_default() {
            let attachment = local.get_attachment(id, &name)?;
            local.put_attachment(&new_id, &name, attachment)?;
        }
        optional(local.remove(id))?;
        signatures.remove(id)?;
        signatures.put(&new_id, &SignatureRecord::new(hash, Origin::Local))?;

        tracing::debug!(id, new_id = %new_id, "document moved to remote-assigned id");
        self.settled.insert(id);
        self.settled.insert(new_id);
        self.counters.record(Outcome::DocumentPropagated);
        Ok(())
    }

    /// Deletes a document on side `target`.
    ///
    /// Attachments are synchronized first; the document only goes once the
    /// target holds no attachment anymore. Otherwise the deletion waits for a
    /// later cycle and the signature is kept.
    fn propagate_deletion(&self, target: Origin, id: &str) -> StorageResult<()> {
        let storage = self.engine.storage(target);
        match self.remove_without_attachments(storage, id) {
            Ok(true) => self.counters.record(Outcome::DocumentDeleted),
            Ok(false) => {
                tracing::warn!(id, side = ?target, "deletion postponed, attachments remain");
                self.counters.record(Outcome::DocumentDeferred);
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(id, error = %e, "deletion postponed");
                self.counters.record(Outcome::DocumentDeferred);
            }
            Err(e) => return Err(e),
        }
        self.settled.insert(id);
        Ok(())
    }

    fn remove_without_attachments(
        &self,
        storage: &dyn DocumentStorage,
        id: &str,
    ) -> StorageResult<bool> {
        AttachmentSync::new(self.engine, self.counters).sync_document(id)?;
        if !storage.all_attachments(id)?.is_empty() {
            return Ok(false);
        }
        storage.remove(id)?;
        self.engine.signatures().remove(id)?;
        Ok(true)
    }
}

fn fetch(
    storage: &dyn DocumentStorage,
    id: &str,
) -> StorageResult<(Option<String>, Option<Document>)> {
    Ok(match optional(storage.get(id))? {
        Some(doc) => (Some(hash_document(&doc)), Some(doc)),
        None => (None, None),
    })
}

/// Fingerprint carried by a listing row, if the row has the field.
fn listed_hash(value: &Document, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(hash) => Some(hash.clone()),
        other => Some(canonicalize_value(other)),
    }
}

/// Fingerprints of every document of a storage, read through `key`.
///
/// Documents without the field are fetched and hashed instead.
fn list_hashes(storage: &dyn DocumentStorage, key: &str) -> StorageResult<HashMap<String, String>> {
    let listing = storage.all_docs(&QueryOptions::new().with_select_list([key]))?;
    let mut hashes = HashMap::with_capacity(listing.rows.len());
    for row in listing.rows {
        let hash = match listed_hash(&row.value, key) {
            Some(hash) => hash,
            None => match fetch(storage, &row.id)?.0 {
                Some(hash) => hash,
                None => continue,
            },
        };
        hashes.insert(row.id, hash);
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn listed_hash_reads_the_field() {
        assert_eq!(
            listed_hash(&doc(json!({"_hash": "abc"})), "_hash").as_deref(),
            Some("abc")
        );
        assert_eq!(
            listed_hash(&doc(json!({"_hash": 12})), "_hash").as_deref(),
            Some("12")
        );
        assert!(listed_hash(&doc(json!({"other": 1})), "_hash").is_none());
    }

    #[test]
    fn list_hashes_falls_back_to_content() {
        let storage = docsync_storage::MemoryStorage::new();
        storage.put("a", doc(json!({"_hash": "h1"}))).unwrap();
        storage.put("b", doc(json!({"title": "x"}))).unwrap();

        let hashes = list_hashes(&storage, "_hash").unwrap();
        assert_eq!(hashes["a"], "h1");
        assert_eq!(hashes["b"], hash_document(&doc(json!({"title": "x"}))));
    }
}
