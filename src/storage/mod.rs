//! Trace storage.

mod memory;
mod traits;

pub use memory::InMemoryTraceStore;
pub use traits::{StorageError, TraceStore};
