// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Pubsub error: {0}")]
    Pubsub(#[from] crate::port::PubsubError),

    /// The caller's context was canceled while waiting for a job
    #[error("context canceled")]
    Canceled,

    /// The caller's deadline passed while waiting for a job
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The job store failed with something other than "no job available"
    #[error("failed to acquire job: {0}")]
    AcquireFailed(#[source] Box<AppError>),

    /// Coordinator state is corrupted; never expected in a correct build
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
