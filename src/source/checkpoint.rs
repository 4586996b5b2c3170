use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Resume position for one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Items successfully parsed so far
    pub processed_count: u64,

    /// Last line (1-based) accounted for
    pub line_number: u64,

    /// Remote sources only: byte offset just past `line_number`
    pub byte_offset: Option<u64>,
}

/// In-memory checkpoints keyed by source identifier (path or URL).
///
/// Cloning the store shares the underlying map. Nothing is persisted beyond
/// the life of the process. Concurrent reads of the *same* source through one
/// store are not coordinated and must be avoided by the caller.
#[derive(Debug, Clone, Default)]
pub struct CheckpointStore {
    inner: Arc<Mutex<HashMap<String, Checkpoint>>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        CheckpointStore::default()
    }

    pub fn get(&self, source: &str) -> Option<Checkpoint> {
        self.lock().get(source).copied()
    }

    pub fn save(&self, source: &str, checkpoint: Checkpoint) {
        self.lock().insert(source.to_string(), checkpoint);
    }

    /// Forget the checkpoint for `source`, so the next read starts over
    pub fn clear(&self, source: &str) -> Option<Checkpoint> {
        self.lock().remove(source)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Checkpoint>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
