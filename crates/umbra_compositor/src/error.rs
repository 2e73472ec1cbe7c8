//! Compositor error types

use thiserror::Error;
use umbra_scene::SceneError;

/// Compositor errors
///
/// Every variant is fatal for the frame: nothing in the shadow pipeline is
/// retried.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Rendering API error: {0}")]
    RenderingApi(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Definition parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Result type for compositor operations
pub type CompositorResult<T> = Result<T, CompositorError>;
