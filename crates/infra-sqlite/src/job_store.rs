// SQLite JobStore / JobRepository Implementation

use async_trait::async_trait;
use provisionerd_core::domain::{JobId, ProvisionerJob, ProvisionerType, Tags};
use provisionerd_core::error::{AppError, Result};
use provisionerd_core::port::{AcquireJobParams, JobRepository, JobStore};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

// Helper to convert sqlx::Error to AppError with structured information
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

/// Job store backed by the `provisioner_jobs` table.
///
/// Acquisition scans the organization's pending jobs oldest first and claims
/// the first runnable one with a conditional update, so concurrent callers
/// never claim the same row.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Pending jobs of `organization_id` for any of `types`, oldest first.
    /// Rows that fail to decode are logged and skipped.
    async fn pending_jobs(
        &self,
        organization_id: Uuid,
        types: &[ProvisionerType],
    ) -> Result<Vec<ProvisionerJob>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; types.len()].join(", ");
        let sql = format!(
            r#"
            SELECT * FROM provisioner_jobs
            WHERE organization_id = ? AND started_at IS NULL
              AND provisioner IN ({})
            ORDER BY created_at ASC, id ASC
            "#,
            placeholders
        );
        let mut query = sqlx::query_as::<_, JobRow>(&sql).bind(organization_id.to_string());
        for provisioner in types {
            query = query.bind(provisioner.as_str());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id.clone();
                match row.into_job() {
                    Ok(job) => Some(job),
                    Err(e) => {
                        warn!(job_id = %id, error = %e, "skipping undecodable job row");
                        None
                    }
                }
            })
            .collect())
    }

    /// Claim `id` unless someone else already has. Returns whether we won.
    async fn try_claim(&self, id: &JobId, worker_id: Uuid, started_at: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE provisioner_jobs
            SET started_at = ?, worker_id = ?
            WHERE id = ? AND started_at IS NULL
            "#,
        )
        .bind(started_at)
        .bind(worker_id.to_string())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn acquire_provisioner_job(
        &self,
        params: AcquireJobParams,
    ) -> Result<Option<ProvisionerJob>> {
        let provisioner_tags = params.decode_tags()?;

        for mut job in self
            .pending_jobs(params.organization_id, &params.types)
            .await?
        {
            if !job.acquirable_by(params.organization_id, &params.types, &provisioner_tags) {
                continue;
            }
            if !self
                .try_claim(&job.id, params.worker_id, params.started_at)
                .await?
            {
                debug!(job_id = %job.id, "job claimed by another worker, trying next");
                continue;
            }
            job.claim(params.worker_id, params.started_at)?;
            return Ok(Some(job));
        }
        Ok(None)
    }
}

#[async_trait]
impl JobRepository for SqliteJobStore {
    async fn insert_job(&self, job: &ProvisionerJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO provisioner_jobs (
                id, created_at, organization_id, initiator_id,
                provisioner, job_type, tags, input,
                started_at, worker_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job.created_at)
        .bind(job.organization_id.to_string())
        .bind(job.initiator_id.to_string())
        .bind(job.provisioner.as_str())
        .bind(job.job_type.as_str())
        .bind(job.tags.to_json()?)
        .bind(job.input.to_string())
        .bind(job.started_at)
        .bind(job.worker_id.map(|w| w.to_string()))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_job(&self, id: &JobId) -> Result<Option<ProvisionerJob>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM provisioner_jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    created_at: i64,
    organization_id: String,
    initiator_id: String,
    provisioner: String,
    job_type: String,
    tags: String,
    input: String,
    started_at: Option<i64>,
    worker_id: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<ProvisionerJob> {
        Ok(ProvisionerJob {
            id: parse_uuid(&self.id)?,
            created_at: self.created_at,
            organization_id: parse_uuid(&self.organization_id)?,
            initiator_id: parse_uuid(&self.initiator_id)?,
            provisioner: self.provisioner.parse()?,
            job_type: self.job_type.parse()?,
            tags: Tags::from_json(&self.tags)?,
            input: serde_json::from_str(&self.input)?,
            started_at: self.started_at,
            worker_id: self.worker_id.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(format!("corrupt uuid '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use provisionerd_core::domain::JobStatus;
    use std::sync::Arc;

    async fn setup_test_db() -> SqliteJobStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteJobStore::new(pool)
    }

    fn params(org: Uuid, tags: &Tags) -> AcquireJobParams {
        AcquireJobParams {
            organization_id: org,
            worker_id: Uuid::new_v4(),
            started_at: 1_700_000_000_000,
            types: vec![ProvisionerType::Echo],
            provisioner_tags: tags.to_json().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = setup_test_db().await;
        let org = Uuid::new_v4();
        let job = ProvisionerJob::new_test(org, ProvisionerType::Echo, Tags::untagged());

        store.insert_job(&job).await.unwrap();

        let found = store.find_job(&job.id).await.unwrap();
        assert_eq!(found, Some(job));
        assert!(store.find_job(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_claims_oldest_first() {
        let store = setup_test_db().await;
        let org = Uuid::new_v4();
        let mut older = ProvisionerJob::new_test(org, ProvisionerType::Echo, Tags::untagged());
        older.created_at = 1;
        let mut newer = ProvisionerJob::new_test(org, ProvisionerType::Echo, Tags::untagged());
        newer.created_at = 2;
        store.insert_job(&newer).await.unwrap();
        store.insert_job(&older).await.unwrap();

        let p = params(org, &Tags::untagged());
        let acquired = store.acquire_provisioner_job(p.clone()).await.unwrap().unwrap();
        assert_eq!(acquired.id, older.id);
        assert_eq!(acquired.worker_id, Some(p.worker_id));
        assert_eq!(acquired.started_at, Some(p.started_at));

        let stored = store.find_job(&older.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), JobStatus::Running);

        let next = store.acquire_provisioner_job(p.clone()).await.unwrap().unwrap();
        assert_eq!(next.id, newer.id);
        assert!(store.acquire_provisioner_job(p).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_acquire_respects_capabilities() {
        let store = setup_test_db().await;
        let org = Uuid::new_v4();
        let job = ProvisionerJob::new_test(
            org,
            ProvisionerType::Terraform,
            Tags::from([("environment", "on-prem")]),
        );
        store.insert_job(&job).await.unwrap();

        let tags = Tags::from([("environment", "on-prem")]);
        // wrong type
        assert!(store
            .acquire_provisioner_job(params(org, &tags))
            .await
            .unwrap()
            .is_none());
        // wrong organization
        let mut other_org = params(Uuid::new_v4(), &tags);
        other_org.types = vec![ProvisionerType::Terraform];
        assert!(store
            .acquire_provisioner_job(other_org)
            .await
            .unwrap()
            .is_none());

        let mut ok = params(org, &tags);
        ok.types = vec![ProvisionerType::Echo, ProvisionerType::Terraform];
        assert_eq!(
            store.acquire_provisioner_job(ok).await.unwrap().unwrap().id,
            job.id
        );
    }

    #[tokio::test]
    async fn test_acquire_skips_corrupt_rows() {
        let store = setup_test_db().await;
        let org = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO provisioner_jobs (
                id, created_at, organization_id, initiator_id,
                provisioner, job_type, tags, input
            ) VALUES (?, 1, ?, ?, 'echo', 'workspace_build', '{not json', '{}')
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(org.to_string())
        .bind(Uuid::new_v4().to_string())
        .execute(&store.pool)
        .await
        .unwrap();
        let mut good = ProvisionerJob::new_test(org, ProvisionerType::Echo, Tags::untagged());
        good.created_at = 2;
        store.insert_job(&good).await.unwrap();

        let acquired = store
            .acquire_provisioner_job(params(org, &Tags::untagged()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(acquired.id, good.id);
        assert!(store
            .acquire_provisioner_job(params(org, &Tags::untagged()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_claims_each_job_once() {
        // file-backed so writers really contend
        let path = std::env::temp_dir().join(format!("provisionerd-{}.db", Uuid::new_v4()));
        let pool = create_pool(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Arc::new(SqliteJobStore::new(pool));
        let org = Uuid::new_v4();
        for _ in 0..5 {
            let job = ProvisionerJob::new_test(org, ProvisionerType::Echo, Tags::untagged());
            store.insert_job(&job).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .acquire_provisioner_job(params(org, &Tags::untagged()))
                    .await
                    .unwrap()
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                claimed.push(job.id);
            }
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 5);

        let _ = std::fs::remove_file(&path);
    }
}
