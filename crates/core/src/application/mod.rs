// Application Layer - Use Cases and Coordination

pub mod acquirer;
pub mod job_posting;
pub mod retry;

// Re-exports
pub use acquirer::{Acquirer, AcquirerConfig, WorkerRegistration};
pub use job_posting::{JobPostingService, PostJobRequest};
