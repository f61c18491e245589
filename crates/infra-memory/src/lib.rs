// Provisionerd Infrastructure - In-Process Adapters
// Implements: Pubsub (broadcast fan-out), JobStore + JobRepository (Vec-backed)

pub mod job_store;
pub mod pubsub;

pub use job_store::InMemoryJobStore;
pub use pubsub::{InMemoryPubsub, DEFAULT_CHANNEL_CAPACITY};
