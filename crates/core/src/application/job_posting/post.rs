// Post Job Use Case

use crate::domain::{
    JobPosting, ProvisionerJob, ProvisionerJobType, ProvisionerType, Tags, EVENT_JOB_POSTED,
};
use crate::error::Result;
use crate::port::{IdProvider, JobRepository, Pubsub, TimeProvider};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Request to create a new pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostJobRequest {
    pub organization_id: Uuid,
    pub initiator_id: Uuid,
    pub provisioner_type: ProvisionerType,
    pub job_type: ProvisionerJobType,

    /// Normalized with [`Tags::mutate`] before storing
    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub input: serde_json::Value,
}

/// Execute post job use case
///
/// # Arguments
///
/// * `job_repo` - Job repository
/// * `pubsub` - Bus the posting is announced on
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Post job request
pub async fn execute(
    job_repo: &dyn JobRepository,
    pubsub: &dyn Pubsub,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: PostJobRequest,
) -> Result<ProvisionerJob> {
    let tags = Tags::mutate(req.initiator_id, &req.tags);
    tags.validate()?;

    let job = ProvisionerJob::new(
        id_provider.generate_id(),
        time_provider.now_millis(),
        req.organization_id,
        req.initiator_id,
        req.provisioner_type,
        req.job_type,
        tags,
        req.input,
    );
    job_repo.insert_job(&job).await?;
    info!(
        job_id = %job.id,
        organization_id = %job.organization_id,
        provisioner_type = %job.provisioner,
        "job inserted"
    );

    // The job is durable now; a lost posting only delays it until a backup poll
    if let Err(e) = post_job(pubsub, &job).await {
        warn!(job_id = %job.id, error = %e, "failed to post job to pubsub");
    }
    Ok(job)
}

/// Announce a freshly inserted job to waiting provisioner daemons
pub async fn post_job(pubsub: &dyn Pubsub, job: &ProvisionerJob) -> Result<()> {
    let message = JobPosting::for_job(job).encode()?;
    pubsub.publish(EVENT_JOB_POSTED, &message).await
}
