// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("tags cannot contain the null byte (0x00)")]
    TagsContainNullByte,

    #[error("Unknown provisioner type: {0}")]
    UnknownProvisionerType(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
