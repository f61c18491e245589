//! Shared harness for the end-to-end tests: a file-backed SQLite job store,
//! the in-memory pubsub and a running acquirer wired the way the daemon does it.

use provisionerd_core::application::{
    Acquirer, AcquirerConfig, JobPostingService, PostJobRequest, WorkerRegistration,
};
use provisionerd_core::domain::{ProvisionerJob, ProvisionerJobType, ProvisionerType, Tags};
use provisionerd_core::port::id_provider::UuidProvider;
use provisionerd_core::port::time_provider::SystemTimeProvider;
use provisionerd_core::port::JobRepository;
use provisionerd_infra_memory::InMemoryPubsub;
use provisionerd_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Long enough that only postings wake waiters unless a test opts in
pub const QUIET_BACKUP_POLL: Duration = Duration::from_secs(3600);

pub struct TestEnv {
    pub lifetime: CancellationToken,
    pub store: Arc<SqliteJobStore>,
    pub pubsub: Arc<InMemoryPubsub>,
    pub acquirer: Acquirer,
    pub posting: Arc<JobPostingService>,
    db_path: PathBuf,
}

impl TestEnv {
    pub async fn new() -> Self {
        Self::with_backup_poll(QUIET_BACKUP_POLL).await
    }

    pub async fn with_backup_poll(backup_poll_interval: Duration) -> Self {
        // file-backed so concurrent domains really contend on the database
        let db_path =
            std::env::temp_dir().join(format!("provisionerd-e2e-{}.db", Uuid::new_v4()));
        let pool = create_pool(&format!("sqlite://{}", db_path.display()))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let lifetime = CancellationToken::new();
        let time_provider = Arc::new(SystemTimeProvider);
        let store = Arc::new(SqliteJobStore::new(pool));
        let pubsub = Arc::new(InMemoryPubsub::new());
        let acquirer = Acquirer::new(
            lifetime.child_token(),
            store.clone(),
            pubsub.clone(),
            time_provider.clone(),
            AcquirerConfig {
                backup_poll_interval,
                ..Default::default()
            },
        )
        .await;
        let posting = Arc::new(JobPostingService::new(
            store.clone(),
            pubsub.clone(),
            Arc::new(UuidProvider),
            time_provider,
        ));

        Self {
            lifetime,
            store,
            pubsub,
            acquirer,
            posting,
            db_path,
        }
    }

    pub fn registration(
        &self,
        organization_id: Uuid,
        provisioner_types: Vec<ProvisionerType>,
        tags: Tags,
    ) -> WorkerRegistration {
        WorkerRegistration::new(organization_id, Uuid::new_v4(), provisioner_types, tags).unwrap()
    }

    /// Insert and announce an echo workspace build
    pub async fn post(&self, organization_id: Uuid, tags: Tags) -> ProvisionerJob {
        self.posting
            .post_job(PostJobRequest {
                organization_id,
                initiator_id: Uuid::new_v4(),
                provisioner_type: ProvisionerType::Echo,
                job_type: ProvisionerJobType::WorkspaceBuild,
                tags,
                input: serde_json::json!({}),
            })
            .await
            .unwrap()
    }

    /// Insert without publishing a posting
    pub async fn insert_silently(&self, job: &ProvisionerJob) {
        self.store.insert_job(job).await.unwrap();
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        self.lifetime.cancel();
        self.pubsub.close();
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.db_path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}
