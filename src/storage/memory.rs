//! In-memory storage backend.
//!
//! Thread-safe, append-only. Intended for embedded usage, tests and as a
//! reference implementation of [`TraceStore`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::storage::traits::{StorageError, TraceStore};
use crate::trace::{ReasoningTrace, TraceId};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct TraceState {
    by_id: HashMap<TraceId, usize>,
    // Insertion order.
    log: Vec<ReasoningTrace>,
}

/// In-memory trace store.
#[derive(Debug, Default)]
pub struct InMemoryTraceStore {
    state: RwLock<TraceState>,
}

impl InMemoryTraceStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored traces.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendError` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("trace.len"))?;
        Ok(state.log.len())
    }

    /// Returns true if no trace has been stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendError` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl TraceStore for InMemoryTraceStore {
    fn save_trace(&self, trace: ReasoningTrace) -> Result<TraceId, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("trace.save"))?;
        let id = trace.id;
        if state.by_id.contains_key(&id) {
            return Err(StorageError::DuplicateKey(id.to_string()));
        }
        let idx = state.log.len();
        state.log.push(trace);
        state.by_id.insert(id, idx);
        Ok(id)
    }

    fn get(&self, id: TraceId) -> Result<Option<ReasoningTrace>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("trace.get"))?;
        Ok(state.by_id.get(&id).map(|&idx| state.log[idx].clone()))
    }

    fn list_recent(&self, symptom: Option<&str>, limit: usize) -> Result<Vec<ReasoningTrace>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("trace.list_recent"))?;
        Ok(state
            .log
            .iter()
            .rev()
            .filter(|t| symptom.map_or(true, |s| t.symptom == s))
            .take(limit)
            .cloned()
            .collect())
    }
}
