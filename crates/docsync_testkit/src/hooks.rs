//! Storage hooks for tests.

use docsync_storage::{Operation, StorageHook, Target};
use parking_lot::Mutex;

/// Counts successful mutations going through a checked storage.
///
/// Each write is also logged as `"<operation> <id>[/<name>]"`.
#[derive(Debug, Default)]
pub struct WriteCounter {
    writes: Mutex<Vec<String>>,
}

impl WriteCounter {
    /// Creates a counter with no recorded write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes since creation or the last reset.
    pub fn count(&self) -> usize {
        self.writes.lock().len()
    }

    /// Recorded writes, oldest first.
    pub fn operations(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    /// Forgets every recorded write.
    pub fn reset(&self) {
        self.writes.lock().clear();
    }
}

impl StorageHook for WriteCounter {
    fn after(&self, operation: Operation, target: Target<'_>) {
        if !operation.is_mutation() {
            return;
        }
        let entry = match (target.id, target.name) {
            (Some(id), Some(name)) => format!("{operation} {id}/{name}"),
            (Some(id), None) => format!("{operation} {id}"),
            _ => operation.to_string(),
        };
        self.writes.lock().push(entry);
    }
}
