//! Skeleton error types

use thiserror::Error;

/// Skeleton errors
#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Invalid skeleton: {0}")]
    InvalidHierarchy(String),

    #[error("Animation '{0}' is already enabled")]
    AlreadyEnabled(String),

    #[error("Animation '{0}' is not enabled")]
    NotEnabled(String),
}

/// Result type for skeleton operations
pub type SkeletonResult<T> = Result<T, SkeletonError>;
