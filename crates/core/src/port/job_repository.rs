// Job Repository Port (Interface)

use crate::domain::{JobId, ProvisionerJob};
use crate::error::Result;
use async_trait::async_trait;

/// Repository interface for job persistence outside of acquisition
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new pending job
    async fn insert_job(&self, job: &ProvisionerJob) -> Result<()>;

    /// Find job by ID
    async fn find_job(&self, id: &JobId) -> Result<Option<ProvisionerJob>>;
}
