//! Bounded worker pool for per-id jobs.
//!
//! A batch is fed through a channel holding at most `workers` pending jobs
//! and drained by `workers` scoped threads. Jobs of one batch have no order
//! relative to each other. A failing job does not stop its siblings: the
//! batch always drains, then the first error is returned.
//!
//! A conflict only stops its own id. [`HeldConflict`] lets later batches and
//! passes run before the first conflict is reported.

use crossbeam_channel::bounded;
use docsync_storage::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::thread;

/// Runs batches of jobs with a fixed degree of parallelism.
#[derive(Debug, Clone, Copy)]
pub struct DispatchQueue {
    workers: usize,
}

impl DispatchQueue {
    /// Creates a queue; `0` is treated as `1`.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Degree of parallelism.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `job` once per item and waits for all of them.
    ///
    /// With a single worker, jobs run inline in iteration order.
    pub fn run<T, I, F>(&self, items: I, job: F) -> StorageResult<()>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        F: Fn(T) -> StorageResult<()> + Sync,
    {
        if self.workers == 1 {
            let errors = items.into_iter().filter_map(|item| job(item).err()).collect();
            return first_error(errors);
        }

        let (sender, receiver) = bounded::<T>(self.workers);
        let errors = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..self.workers {
                let receiver = receiver.clone();
                let (errors, job) = (&errors, &job);
                scope.spawn(move || {
                    for item in receiver.iter() {
                        if let Err(e) = job(item) {
                            errors.lock().push(e);
                        }
                    }
                });
            }
            drop(receiver);

            for item in items {
                if sender.send(item).is_err() {
                    break;
                }
            }
            drop(sender);
        });

        first_error(errors.into_inner())
    }
}

/// Picks the error a batch reports: the first non-conflict one, otherwise the
/// first conflict. The rest are logged.
fn first_error(mut errors: Vec<StorageError>) -> StorageResult<()> {
    if errors.is_empty() {
        return Ok(());
    }
    let index = errors.iter().position(|e| !e.is_conflict()).unwrap_or(0);
    let first = errors.remove(index);
    for other in errors {
        tracing::warn!(error = %other, "additional failure in dispatch batch");
    }
    Err(first)
}

/// The first conflict of a cycle, kept while the remaining work runs.
#[derive(Debug, Default)]
pub(crate) struct HeldConflict {
    first: Option<StorageError>,
}

impl HeldConflict {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Keeps a conflict and lets the caller carry on; any other error is
    /// returned as is.
    pub(crate) fn absorb(&mut self, result: StorageResult<()>) -> StorageResult<()> {
        match result {
            Err(e) if e.is_conflict() => {
                if self.first.is_none() {
                    self.first = Some(e);
                } else {
                    tracing::warn!(error = %e, "additional conflict in repair cycle");
                }
                Ok(())
            }
            other => other,
        }
    }

    /// The held conflict, if any.
    pub(crate) fn into_result(self) -> StorageResult<()> {
        match self.first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Ids already resolved in the current cycle, shared by every worker.
#[derive(Debug, Default)]
pub struct SettledIds {
    ids: Mutex<HashSet<String>>,
}

impl SettledIds {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an id settled; returns false if it already was.
    pub fn insert(&self, id: impl Into<String>) -> bool {
        self.ids.lock().insert(id.into())
    }

    /// Returns true if the id is settled.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    /// Number of settled ids.
    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    /// Returns true if nothing is settled yet.
    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}
