//! Abstract trace-store contract.
//!
//! The agent persists one append-only [`ReasoningTrace`] per query through
//! this trait. Backends own durability; the in-memory store in
//! [`super::memory`] is the reference implementation.

use thiserror::Error;

use crate::trace::{ReasoningTrace, TraceId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Trace not found.
    #[error("Trace not found: {0}")]
    TraceNotFound(TraceId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Append-only storage for reasoning traces.
///
/// Implementations must be safe for concurrent use; distinct queries may
/// save traces at the same time.
pub trait TraceStore: Send + Sync {
    /// Persist a sealed trace. Returns error if the ID already exists.
    fn save_trace(&self, trace: ReasoningTrace) -> Result<TraceId, StorageError>;

    /// Get a trace by ID.
    fn get(&self, id: TraceId) -> Result<Option<ReasoningTrace>, StorageError>;

    /// Most recent traces first, optionally restricted to an exact symptom.
    fn list_recent(&self, symptom: Option<&str>, limit: usize) -> Result<Vec<ReasoningTrace>, StorageError>;
}
