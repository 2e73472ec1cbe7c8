//! Scene error types

use thiserror::Error;

use crate::light::LightId;

/// Scene manager errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("Light not found: {0:?}")]
    LightNotFound(LightId),

    #[error("Scene object not found: {0}")]
    ObjectNotFound(usize),

    #[error("Render queue {queue} out of range (scene has {count} queues)")]
    InvalidRenderQueue { queue: usize, count: usize },
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
