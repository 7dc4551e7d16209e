//! Per-cycle report and cumulative statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What one repair cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Documents copied from one side to the other.
    pub documents_propagated: u64,
    /// Documents deleted on one side because the other deleted them.
    pub documents_deleted: u64,
    /// Deletions postponed because attachments were still present.
    pub documents_deferred: u64,
    /// Divergent documents left alone by the ignore policy.
    pub documents_ignored: u64,
    /// Attachments copied from one side to the other.
    pub attachments_propagated: u64,
    /// Attachments deleted on one side because the other deleted them.
    pub attachments_deleted: u64,
    /// Divergent attachments left alone by the ignore policy.
    pub attachments_ignored: u64,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl RepairReport {
    /// Returns true if the cycle wrote nothing to either side.
    pub fn is_noop(&self) -> bool {
        self.documents_propagated == 0
            && self.documents_deleted == 0
            && self.attachments_propagated == 0
            && self.attachments_deleted == 0
    }
}

/// Cumulative statistics of a replicated storage.
#[derive(Debug, Clone, Default)]
pub struct ReplicateStats {
    /// Cycles that finished without error.
    pub cycles_completed: u64,
    /// Cycles that returned an error.
    pub cycles_failed: u64,
    /// Documents propagated over all cycles.
    pub documents_propagated: u64,
    /// Documents deleted over all cycles.
    pub documents_deleted: u64,
    /// End of the last cycle, successful or not.
    pub last_repair_time: Option<Instant>,
    /// Error of the last cycle, cleared by a successful one.
    pub last_error: Option<String>,
}

impl ReplicateStats {
    pub(crate) fn record_success(&mut self, report: &RepairReport) {
        self.cycles_completed += 1;
        self.documents_propagated += report.documents_propagated;
        self.documents_deleted += report.documents_deleted;
        self.last_repair_time = Some(Instant::now());
        self.last_error = None;
    }

    pub(crate) fn record_failure(&mut self, error: &impl std::fmt::Display) {
        self.cycles_failed += 1;
        self.last_repair_time = Some(Instant::now());
        self.last_error = Some(error.to_string());
    }
}

/// Outcome counted by a running cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    DocumentPropagated,
    DocumentDeleted,
    DocumentDeferred,
    DocumentIgnored,
    AttachmentPropagated,
    AttachmentDeleted,
    AttachmentIgnored,
}

/// Counters shared by the workers of one cycle.
#[derive(Debug, Default)]
pub(crate) struct RepairCounters {
    documents_propagated: AtomicU64,
    documents_deleted: AtomicU64,
    documents_deferred: AtomicU64,
    documents_ignored: AtomicU64,
    attachments_propagated: AtomicU64,
    attachments_deleted: AtomicU64,
    attachments_ignored: AtomicU64,
}

impl RepairCounters {
    pub(crate) fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::DocumentPropagated => &self.documents_propagated,
            Outcome::DocumentDeleted => &self.documents_deleted,
            Outcome::DocumentDeferred => &self.documents_deferred,
            Outcome::DocumentIgnored => &self.documents_ignored,
            Outcome::AttachmentPropagated => &self.attachments_propagated,
            Outcome::AttachmentDeleted => &self.attachments_deleted,
            Outcome::AttachmentIgnored => &self.attachments_ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self, duration: Duration) -> RepairReport {
        RepairReport {
            documents_propagated: self.documents_propagated.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
            documents_deferred: self.documents_deferred.load(Ordering::Relaxed),
            documents_ignored: self.documents_ignored.load(Ordering::Relaxed),
            attachments_propagated: self.attachments_propagated.load(Ordering::Relaxed),
            attachments_deleted: self.attachments_deleted.load(Ordering::Relaxed),
            attachments_ignored: self.attachments_ignored.load(Ordering::Relaxed),
            duration,
        }
    }
}
