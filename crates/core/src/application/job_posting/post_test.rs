//! Unit tests for posting jobs

use super::*;
use crate::domain::{
    DomainError, JobId, JobPosting, JobStatus, ProvisionerJobType, ProvisionerType, Tags,
    EVENT_JOB_POSTED,
};
use crate::error::AppError;
use crate::port::time_provider::ManualTimeProvider;
use crate::port::{ListenerWithErr, PubsubError, Subscription};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[derive(Default)]
struct MemoryRepo {
    jobs: Mutex<Vec<ProvisionerJob>>,
}

#[async_trait]
impl JobRepository for MemoryRepo {
    async fn insert_job(&self, job: &ProvisionerJob) -> Result<()> {
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }

    async fn find_job(&self, id: &JobId) -> Result<Option<ProvisionerJob>> {
        Ok(self.jobs.lock().unwrap().iter().find(|j| &j.id == id).cloned())
    }
}

/// Records publishes; optionally fails them
#[derive(Default)]
struct RecordingPubsub {
    fail: bool,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait]
impl Pubsub for RecordingPubsub {
    async fn subscribe_with_err(
        &self,
        _event: &str,
        _listener: ListenerWithErr,
    ) -> Result<Subscription> {
        Err(PubsubError::Subscribe("not supported".into()).into())
    }

    async fn publish(&self, event: &str, message: &[u8]) -> Result<()> {
        if self.fail {
            return Err(PubsubError::Publish("connection refused".into()).into());
        }
        self.published
            .lock()
            .unwrap()
            .push((event.to_string(), message.to_vec()));
        Ok(())
    }
}

struct FixedIdProvider(Uuid);

impl IdProvider for FixedIdProvider {
    fn generate_id(&self) -> Uuid {
        self.0
    }
}

fn service(
    repo: Arc<MemoryRepo>,
    pubsub: Arc<RecordingPubsub>,
    id: Uuid,
) -> JobPostingService {
    JobPostingService::new(
        repo,
        pubsub,
        Arc::new(FixedIdProvider(id)),
        Arc::new(ManualTimeProvider::new(1_700_000_000_000)),
    )
}

fn request(tags: Tags) -> PostJobRequest {
    PostJobRequest {
        organization_id: Uuid::new_v4(),
        initiator_id: Uuid::new_v4(),
        provisioner_type: ProvisionerType::Terraform,
        job_type: ProvisionerJobType::TemplateVersionImport,
        tags,
        input: json!({"template_version_id": "abc"}),
    }
}

#[tokio::test]
async fn test_post_job_inserts_and_publishes() {
    let repo = Arc::new(MemoryRepo::default());
    let pubsub = Arc::new(RecordingPubsub::default());
    let id = Uuid::new_v4();
    let svc = service(repo.clone(), pubsub.clone(), id);

    let req = request(Tags::from([("environment", "on-prem")]));
    let org = req.organization_id;
    let job = assert_ok!(svc.post_job(req).await);

    assert_eq!(job.id, id);
    assert_eq!(job.created_at, 1_700_000_000_000);
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(svc.find_job(&id).await.unwrap(), Some(job.clone()));

    let published = pubsub.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, EVENT_JOB_POSTED);
    let posting = JobPosting::decode(&published[0].1).unwrap();
    assert_eq!(posting.organization_id, Some(org));
    assert_eq!(posting.provisioner_type, ProvisionerType::Terraform);
    assert_eq!(posting.tags, job.tags);
}

#[tokio::test]
async fn test_post_job_normalizes_tags() {
    let repo = Arc::new(MemoryRepo::default());
    let pubsub = Arc::new(RecordingPubsub::default());
    let svc = service(repo, pubsub, Uuid::new_v4());

    let job = svc.post_job(request(Tags::new())).await.unwrap();
    assert_eq!(job.tags, Tags::untagged());

    let req = request(Tags::from([("scope", "user")]));
    let initiator = req.initiator_id.to_string();
    let job = svc.post_job(req).await.unwrap();
    assert_eq!(job.tags.get("owner"), Some(initiator.as_str()));
}

#[tokio::test]
async fn test_post_job_rejects_nul_tags() {
    let repo = Arc::new(MemoryRepo::default());
    let pubsub = Arc::new(RecordingPubsub::default());
    let svc = service(repo.clone(), pubsub.clone(), Uuid::new_v4());

    let err = assert_err!(
        svc.post_job(request(Tags::from([("environment", "on\0prem")])))
            .await
    );
    assert!(matches!(
        err,
        AppError::Domain(DomainError::TagsContainNullByte)
    ));
    assert!(repo.jobs.lock().unwrap().is_empty());
    assert!(pubsub.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_failure_is_not_fatal() {
    let repo = Arc::new(MemoryRepo::default());
    let pubsub = Arc::new(RecordingPubsub {
        fail: true,
        ..RecordingPubsub::default()
    });
    let id = Uuid::new_v4();
    let svc = service(repo.clone(), pubsub, id);

    let job = assert_ok!(svc.post_job(request(Tags::untagged())).await);
    assert_eq!(job.id, id);
    assert_eq!(repo.jobs.lock().unwrap().len(), 1);
}
