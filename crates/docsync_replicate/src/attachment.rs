//! Attachment synchronization of one document.
//!
//! Runs the document decision table once per attachment name, with
//! attachment fingerprints (hashes of the raw bytes) and the attachment
//! signature records of the document. Local-sourced checks run first, then
//! remote-sourced ones; a name settled by the first direction is not looked
//! at again by the second.

use crate::config::Checks;
use crate::dispatch::{DispatchQueue, HeldConflict, SettledIds};
use crate::engine::{conflict, ReplicateStorage};
use crate::hash::hash_attachment;
use crate::report::{Outcome, RepairCounters};
use crate::resolver::{resolve, Action, Bias, Direction};
use crate::signature::Origin;
use docsync_storage::{optional, Attachment, DocumentStorage, StorageError, StorageResult};

pub(crate) struct AttachmentSync<'a> {
    engine: &'a ReplicateStorage,
    counters: &'a RepairCounters,
}

impl<'a> AttachmentSync<'a> {
    pub(crate) fn new(engine: &'a ReplicateStorage, counters: &'a RepairCounters) -> Self {
        Self { engine, counters }
    }

    /// Synchronizes every attachment of `id` in the enabled directions.
    pub(crate) fn sync_document(&self, id: &str) -> StorageResult<()> {
        let config = self.engine.config();
        let settled = SettledIds::new();
        let mut held = HeldConflict::new();
        for direction in [Direction::LocalToRemote, Direction::RemoteToLocal] {
            let checks = config.attachment_checks(direction.source());
            if !checks.any() {
                continue;
            }
            let pass = AttachmentPass {
                engine: self.engine,
                counters: self.counters,
                id,
                direction,
                bias: Bias::new(config.conflict_handling, direction),
                checks,
                settled: &settled,
            };
            held.absorb(pass.run())?;
        }
        held.into_result()
    }
}

struct AttachmentPass<'a> {
    engine: &'a ReplicateStorage,
    counters: &'a RepairCounters,
    id: &'a str,
    direction: Direction,
    bias: Bias,
    checks: Checks,
    settled: &'a SettledIds,
}

impl AttachmentPass<'_> {
    fn storage(&self, side: Origin) -> &dyn DocumentStorage {
        self.engine.storage(side)
    }

    fn run(&self) -> StorageResult<()> {
        let source = self.storage(self.direction.source());
        let listed = optional(source.all_attachments(self.id))?.unwrap_or_default();
        let signed = self.engine.signatures().all_attachments(self.id)?;

        let candidates: Vec<(String, bool)> = listed
            .iter()
            .filter(|name| !self.settled.contains(name))
            .filter_map(|name| {
                let is_modification = signed.contains(name);
                let checked = if is_modification {
                    self.checks.modification
                } else {
                    self.checks.creation
                };
                checked.then(|| (name.clone(), is_modification))
            })
            .collect();

        let queue = DispatchQueue::new(self.engine.config().parallel_operation_attachment_amount);
        let mut held = HeldConflict::new();
        held.absorb(queue.run(candidates, |(name, is_modification)| {
            self.check_difference(&name, is_modification)
        }))?;

        if !self.checks.deletion {
            return held.into_result();
        }
        let deletions: Vec<String> = signed
            .into_iter()
            .filter(|name| !listed.contains(name) && !self.settled.contains(name))
            .collect();
        held.absorb(queue.run(deletions, |name| {
            let status = self.status(&name)?;
            self.check_and_propagate(&name, None, None, status)
        }))?;
        held.into_result()
    }

    fn status(&self, name: &str) -> StorageResult<Option<String>> {
        Ok(optional(self.engine.signatures().get_attachment(self.id, name))?
            .map(|record| record.hash))
    }

    fn fetch(
        &self,
        side: Origin,
        name: &str,
    ) -> StorageResult<(Option<String>, Option<Attachment>)> {
        Ok(
            match optional(self.storage(side).get_attachment(self.id, name))? {
                Some(attachment) => (Some(hash_attachment(&attachment.data)), Some(attachment)),
                None => (None, None),
            },
        )
    }

    fn check_difference(&self, name: &str, is_modification: bool) -> StorageResult<()> {
        let (hash, attachment) = self.fetch(self.direction.source(), name)?;
        let status = if is_modification {
            self.status(name)?
        } else {
            None
        };
        if hash == status {
            return Ok(());
        }
        self.check_and_propagate(name, hash, attachment, status)
    }

    fn check_and_propagate(
        &self,
        name: &str,
        source_hash: Option<String>,
        source_attachment: Option<Attachment>,
        status: Option<String>,
    ) -> StorageResult<()> {
        let source_side = self.direction.source();
        let destination_side = self.direction.destination();
        let (destination_hash, destination_attachment) = self.fetch(destination_side, name)?;

        let action = resolve(
            source_hash.as_deref(),
            destination_hash.as_deref(),
            status.as_deref(),
            self.bias,
        );
        tracing::debug!(
            id = self.id,
            name,
            action = %action,
            direction = %self.direction,
            "resolved attachment"
        );

        match action {
            Action::NoOp => {
                let signatures = self.engine.signatures();
                match source_hash {
                    Some(hash) => signatures.put_attachment(self.id, name, hash)?,
                    None => signatures.remove_attachment(self.id, name)?,
                }
                self.settled.insert(name);
                Ok(())
            }
            Action::PropagateToDestination => {
                self.propagate(destination_side, name, source_attachment, source_hash)
            }
            Action::DeleteOnDestination => self.delete(destination_side, name),
            Action::Ignore => {
                self.counters.record(Outcome::AttachmentIgnored);
                Ok(())
            }
            Action::PropagateToSource => {
                self.propagate(source_side, name, destination_attachment, destination_hash)
            }
            Action::DeleteOnSource => self.delete(source_side, name),
            Action::RaiseConflict => Err(conflict(
                self.direction,
                self.id,
                Some(name),
                source_hash,
                destination_hash,
            )),
        }
    }

    fn propagate(
        &self,
        target: Origin,
        name: &str,
        attachment: Option<Attachment>,
        hash: Option<String>,
    ) -> StorageResult<()> {
        let (Some(attachment), Some(hash)) = (attachment, hash) else {
            return Err(StorageError::backend(format!(
                "cannot propagate absent attachment '{name}' of {}",
                self.id
            )));
        };
        self.storage(target).put_attachment(self.id, name, attachment)?;
        self.engine
            .signatures()
            .put_attachment(self.id, name, hash)?;
        self.settled.insert(name);
        self.counters.record(Outcome::AttachmentPropagated);
        Ok(())
    }

    fn delete(&self, target: Origin, name: &str) -> StorageResult<()> {
        optional(self.storage(target).remove_attachment(self.id, name))?;
        self.engine.signatures().remove_attachment(self.id, name)?;
        self.settled.insert(name);
        self.counters.record(Outcome::AttachmentDeleted);
        Ok(())
    }
}
