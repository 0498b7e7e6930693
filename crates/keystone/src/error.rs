//! # Engine Error Types

use thiserror::Error;

use keystone_core::CoreError;
use keystone_scene::SceneError;

/// Errors raised while bootstrapping or running the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Error from the component runtime or the scheduler.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from the scene layer.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// The engine configuration failed to load.
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
