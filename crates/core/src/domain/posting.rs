// Job Posting - pubsub message announcing a newly inserted job

use super::job::{ProvisionerJob, ProvisionerType};
use super::tags::Tags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pubsub topic carrying [`JobPosting`] messages
pub const EVENT_JOB_POSTED: &str = "provisioner_job_posted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    /// `None` (or nil) for postings from publishers that predate organizations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<Uuid>,
    pub provisioner_type: ProvisionerType,
    #[serde(default)]
    pub tags: Tags,
}

impl JobPosting {
    pub fn for_job(job: &ProvisionerJob) -> Self {
        Self {
            organization_id: Some(job.organization_id),
            provisioner_type: job.provisioner,
            tags: job.tags.clone(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.organization_id.map_or(true, |id| id.is_nil())
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(message: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(message)
    }
}
