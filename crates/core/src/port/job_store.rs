// Job Store Port (Interface)

use crate::domain::{ProvisionerJob, ProvisionerType, Tags};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Parameters for claiming one pending job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireJobParams {
    pub organization_id: Uuid,
    pub worker_id: Uuid,
    /// Claim time (millis since epoch)
    pub started_at: i64,
    pub types: Vec<ProvisionerType>,
    /// Canonical JSON object of the worker's tags
    pub provisioner_tags: String,
}

impl AcquireJobParams {
    pub fn decode_tags(&self) -> Result<Tags> {
        Ok(Tags::from_json(&self.provisioner_tags)?)
    }
}

/// The subset of the job store the acquirer needs.
///
/// Implementations must be safe to call concurrently with different
/// arguments. `Ok(None)` means no matching job is available, which is an
/// expected outcome and not an error.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically claim the oldest pending job matching `params`
    async fn acquire_provisioner_job(&self, params: AcquireJobParams)
        -> Result<Option<ProvisionerJob>>;
}
