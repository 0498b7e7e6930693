//! # Core Error Types
//!
//! All errors that can occur in the component runtime and the task scheduler.

use thiserror::Error;

use crate::ecs::ComponentId;

/// Errors that can occur in the core runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A component store was registered twice under the same ID.
    #[error("component {name} ({id:#010x}) is already registered")]
    AlreadyRegistered {
        /// The component ID.
        id: ComponentId,
        /// Name of the store that was rejected.
        name: &'static str,
    },

    /// A component store was requested before it was registered.
    #[error("component {0:#010x} is not initialized")]
    NotInitialized(ComponentId),

    /// The store registered under an ID is not of the requested type.
    #[error("component {0:#010x} is registered with a different store type")]
    StoreTypeMismatch(ComponentId),

    /// A component blob was shorter than the layout it encodes.
    #[error("component {id:#010x} blob too small: expected {expected} bytes, got {actual}")]
    BlobTooSmall {
        /// The component ID.
        id: ComponentId,
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// A component blob decoded to values the store cannot accept.
    #[error("component {id:#010x} blob invalid: {reason}")]
    InvalidBlob {
        /// The component ID.
        id: ComponentId,
        /// What was wrong with it.
        reason: String,
    },

    /// A blob named a component whose rows cannot be loaded from blobs.
    #[error("component {name} ({id:#010x}) has no loading hook")]
    NoLoadingHook {
        /// The component ID.
        id: ComponentId,
        /// Name of the store.
        name: &'static str,
    },

    /// A loading hook required a value that was not in the value map.
    #[error("value {0:#010x} missing from value map")]
    MissingValue(u32),

    /// A task ID was referenced before any task was scheduled under it.
    #[error("unknown update task {0:#010x}")]
    UnknownTask(u32),

    /// The task graph cannot complete: a cycle or an edge to a task outside the graph.
    #[error("task graph cannot complete, unresolved tasks: {0:?}")]
    UnresolvedTasks(Vec<String>),

    /// One or more tasks panicked while executing.
    #[error("update tasks failed: {0:?}")]
    TaskFailed(Vec<String>),

    /// Worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_ids() {
        let err = CoreError::NotInitialized(0x10);
        assert_eq!(err.to_string(), "component 0x00000010 is not initialized");

        let err = CoreError::UnresolvedTasks(vec!["a".into(), "b".into()]);
        assert!(err.to_string().contains("\"a\""));
    }
}
