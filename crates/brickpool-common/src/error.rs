//! Error types for brickpool
//!
//! This module defines:
//! - `PoolError`: Application-specific error enum
//! - `Result`: Crate-wide result alias

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("conversation '{0}' not found")]
    ConversationNotFound(String),

    #[error("remote view is read-only, refused write of '{0}'")]
    ReadOnlyView(String),

    #[error("unit store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
