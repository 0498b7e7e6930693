//! # Scene Error Types

use thiserror::Error;

use keystone_core::CoreError;

/// Errors raised by scene operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Error from the component runtime or the scheduler.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A camera handle does not refer to a live camera.
    #[error("unknown camera {0:#x}")]
    UnknownCamera(u64),

    /// A scene node handle does not refer to a live node.
    #[error("unknown scene node {0:#x}")]
    UnknownNode(u64),

    /// A blob referenced a node outside the loading context's node table.
    #[error("node index {index} out of range ({count} nodes loaded)")]
    NodeIndexOutOfRange {
        /// Index read from the blob.
        index: u32,
        /// Size of the node table.
        count: usize,
    },

    /// A loaded node's parent link would close a cycle.
    #[error("node {0} cannot be parented without a cycle")]
    NodeCycle(u32),

    /// Scene settings failed to parse or validate.
    #[error("invalid scene settings: {0}")]
    InvalidSettings(String),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
