//! RPC Method Handlers

use crate::error::to_rpc_error;
use crate::types::{
    AcquireJobRequest, AcquireJobResponse, GetJobRequest, GetJobResponse, PostJobRequest,
    PostJobResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use provisionerd_core::application::job_posting;
use provisionerd_core::application::{Acquirer, JobPostingService, WorkerRegistration};
use provisionerd_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ceiling on a client-requested long poll
pub const MAX_ACQUIRE_JOB_LONG_POLL: Duration = Duration::from_secs(60);
/// Floor on a client-requested long poll, so even `timeout_ms: 0` queries once
pub const MIN_ACQUIRE_JOB_LONG_POLL: Duration = Duration::from_millis(100);

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    acquirer: Acquirer,
    posting: Arc<JobPostingService>,
    long_poll: Duration,
    /// Canceled on server shutdown; ends every pending long poll
    shutdown: CancellationToken,
}

impl RpcHandler {
    pub fn new(
        acquirer: Acquirer,
        posting: Arc<JobPostingService>,
        long_poll: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            acquirer,
            posting,
            long_poll,
            shutdown,
        }
    }

    /// provisioner.acquire_job.v1
    ///
    /// If the client goes away the method future is dropped, which withdraws
    /// the caller from the acquirer.
    pub async fn acquire_job(
        &self,
        params: AcquireJobRequest,
    ) -> Result<AcquireJobResponse, ErrorObjectOwned> {
        let registration = WorkerRegistration::new(
            params.organization_id,
            params.worker_id,
            params.provisioner_types,
            params.tags,
        )
        .map_err(to_rpc_error)?;

        let timeout = params
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.long_poll)
            .clamp(MIN_ACQUIRE_JOB_LONG_POLL, MAX_ACQUIRE_JOB_LONG_POLL);

        let job = self
            .acquirer
            .acquire_job_with_timeout(&self.shutdown, timeout, &registration)
            .await
            .map_err(to_rpc_error)?;
        if job.is_none() {
            debug!(worker_id = %params.worker_id, "long poll ended without a job");
        }
        Ok(AcquireJobResponse { job })
    }

    /// provisioner.post_job.v1
    pub async fn post_job(&self, params: PostJobRequest) -> Result<PostJobResponse, ErrorObjectOwned> {
        let req = job_posting::PostJobRequest {
            organization_id: params.organization_id,
            initiator_id: params.initiator_id,
            provisioner_type: params.provisioner_type,
            job_type: params.job_type,
            tags: params.tags,
            input: params.input,
        };

        let job = self.posting.post_job(req).await.map_err(to_rpc_error)?;

        Ok(PostJobResponse {
            job_id: job.id,
            status: job.status(),
        })
    }

    /// provisioner.get_job.v1
    pub async fn get_job(&self, params: GetJobRequest) -> Result<GetJobResponse, ErrorObjectOwned> {
        let job = self
            .posting
            .find_job(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Job {} not found", params.job_id)))
            })?;

        Ok(GetJobResponse {
            status: job.status(),
            job,
        })
    }
}
