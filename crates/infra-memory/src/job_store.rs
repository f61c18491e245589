// Vec-backed JobStore / JobRepository

use async_trait::async_trait;
use provisionerd_core::domain::{JobId, ProvisionerJob};
use provisionerd_core::error::{AppError, Result};
use provisionerd_core::port::{AcquireJobParams, JobRepository, JobStore};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Job store kept in process memory; same claiming rules as the SQLite store
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<Vec<ProvisionerJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ProvisionerJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of jobs not yet acquired
    pub fn pending_count(&self) -> usize {
        self.lock().iter().filter(|j| j.started_at.is_none()).count()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn acquire_provisioner_job(
        &self,
        params: AcquireJobParams,
    ) -> Result<Option<ProvisionerJob>> {
        let provisioner_tags = params.decode_tags()?;
        let mut jobs = self.lock();
        let oldest = jobs
            .iter_mut()
            .filter(|j| j.acquirable_by(params.organization_id, &params.types, &provisioner_tags))
            .min_by_key(|j| (j.created_at, j.id));
        match oldest {
            Some(job) => {
                job.claim(params.worker_id, params.started_at)?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryJobStore {
    async fn insert_job(&self, job: &ProvisionerJob) -> Result<()> {
        let mut jobs = self.lock();
        if jobs.iter().any(|j| j.id == job.id) {
            return Err(AppError::Database(format!("duplicate job id {}", job.id)));
        }
        jobs.push(job.clone());
        Ok(())
    }

    async fn find_job(&self, id: &JobId) -> Result<Option<ProvisionerJob>> {
        Ok(self.lock().iter().find(|j| &j.id == id).cloned())
    }
}
