//! RPC Request/Response Types

use provisionerd_core::domain::{
    JobId, JobStatus, ProvisionerJob, ProvisionerJobType, ProvisionerType, Tags,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// provisioner.acquire_job.v1 - Long-poll for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireJobRequest {
    pub organization_id: Uuid,
    pub worker_id: Uuid,
    pub provisioner_types: Vec<ProvisionerType>,
    #[serde(default)]
    pub tags: Tags,
    /// Overrides the server's long-poll window
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireJobResponse {
    /// `None` when the long poll ended without a job
    pub job: Option<ProvisionerJob>,
}

/// provisioner.post_job.v1 - Create a pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostJobRequest {
    pub organization_id: Uuid,
    pub initiator_id: Uuid,
    pub provisioner_type: ProvisionerType,
    pub job_type: ProvisionerJobType,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// provisioner.get_job.v1 - Look up one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobResponse {
    pub job: ProvisionerJob,
    pub status: JobStatus,
}
