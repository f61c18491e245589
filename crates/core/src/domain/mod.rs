// Domain Layer - Pure business logic and entities

pub mod domain_key;
pub mod error;
pub mod job;
pub mod posting;
pub mod tags;

// Re-exports
pub use domain_key::DomainKey;
pub use error::DomainError;
pub use job::{JobId, JobStatus, ProvisionerJob, ProvisionerJobType, ProvisionerType};
pub use posting::{JobPosting, EVENT_JOB_POSTED};
pub use tags::Tags;
