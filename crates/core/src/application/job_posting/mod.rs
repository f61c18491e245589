// Job Posting Service - creates jobs and announces them

pub mod post;

pub use post::{post_job, PostJobRequest};

use crate::domain::ProvisionerJob;
use crate::error::Result;
use crate::port::{IdProvider, JobRepository, Pubsub, TimeProvider};
use std::sync::Arc;

pub struct JobPostingService {
    job_repo: Arc<dyn JobRepository>,
    pubsub: Arc<dyn Pubsub>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl JobPostingService {
    pub fn new(
        job_repo: Arc<dyn JobRepository>,
        pubsub: Arc<dyn Pubsub>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            job_repo,
            pubsub,
            id_provider,
            time_provider,
        }
    }

    /// Insert a new pending job and post it
    pub async fn post_job(&self, req: PostJobRequest) -> Result<ProvisionerJob> {
        post::execute(
            self.job_repo.as_ref(),
            self.pubsub.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await
    }

    pub async fn find_job(&self, id: &uuid::Uuid) -> Result<Option<ProvisionerJob>> {
        self.job_repo.find_job(id).await
    }
}

#[cfg(test)]
mod post_test;
