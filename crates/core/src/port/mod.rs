// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_repository;
pub mod job_store;
pub mod pubsub;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_repository::JobRepository;
pub use job_store::{AcquireJobParams, JobStore};
pub use pubsub::{ListenerWithErr, Pubsub, PubsubError, Subscription};
pub use time_provider::TimeProvider;
