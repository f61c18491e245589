// Provisioner Job Domain Model

use super::error::{DomainError, Result};
use super::tags::Tags;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Job ID (UUID v4)
pub type JobId = Uuid;

/// Kind of provisioner able to run a job (the "job kind" workers advertise)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerType {
    Echo,
    Terraform,
}

impl ProvisionerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerType::Echo => "echo",
            ProvisionerType::Terraform => "terraform",
        }
    }
}

impl std::fmt::Display for ProvisionerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "echo" => Ok(ProvisionerType::Echo),
            "terraform" => Ok(ProvisionerType::Terraform),
            other => Err(DomainError::UnknownProvisionerType(other.to_string())),
        }
    }
}

/// What a job does once acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionerJobType {
    /// Create, stop or delete a workspace
    WorkspaceBuild,
    TemplateVersionImport,
    TemplateVersionDryRun,
}

impl ProvisionerJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionerJobType::WorkspaceBuild => "workspace_build",
            ProvisionerJobType::TemplateVersionImport => "template_version_import",
            ProvisionerJobType::TemplateVersionDryRun => "template_version_dry_run",
        }
    }
}

impl std::fmt::Display for ProvisionerJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisionerJobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "workspace_build" => Ok(ProvisionerJobType::WorkspaceBuild),
            "template_version_import" => Ok(ProvisionerJobType::TemplateVersionImport),
            "template_version_dry_run" => Ok(ProvisionerJobType::TemplateVersionDryRun),
            other => Err(DomainError::UnknownJobType(other.to_string())),
        }
    }
}

/// Acquisition status, derived from `started_at`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
}

/// A provisioner job as stored in the job store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionerJob {
    pub id: JobId,
    /// Creation time (millis since epoch)
    pub created_at: i64,
    pub organization_id: Uuid,
    pub initiator_id: Uuid,
    pub provisioner: ProvisionerType,
    pub job_type: ProvisionerJobType,
    pub tags: Tags,
    pub input: serde_json::Value,

    /// Set when a worker claims the job
    pub started_at: Option<i64>,
    pub worker_id: Option<Uuid>,
}

impl ProvisionerJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: JobId,
        created_at: i64,
        organization_id: Uuid,
        initiator_id: Uuid,
        provisioner: ProvisionerType,
        job_type: ProvisionerJobType,
        tags: Tags,
        input: serde_json::Value,
    ) -> Self {
        Self {
            id,
            created_at,
            organization_id,
            initiator_id,
            provisioner,
            job_type,
            tags,
            input,
            started_at: None,
            worker_id: None,
        }
    }

    /// Create a pending workspace build for tests
    pub fn new_test(organization_id: Uuid, provisioner: ProvisionerType, tags: Tags) -> Self {
        Self::new(
            Uuid::new_v4(),
            chrono::Utc::now().timestamp_millis(),
            organization_id,
            Uuid::new_v4(),
            provisioner,
            ProvisionerJobType::WorkspaceBuild,
            tags,
            serde_json::json!({}),
        )
    }

    pub fn status(&self) -> JobStatus {
        if self.started_at.is_some() {
            JobStatus::Running
        } else {
            JobStatus::Pending
        }
    }

    /// Mark the job as acquired by `worker_id`
    pub fn claim(&mut self, worker_id: Uuid, now: i64) -> Result<()> {
        if self.status() != JobStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", self.status()),
                to: format!("{:?}", JobStatus::Running),
            });
        }
        self.started_at = Some(now);
        self.worker_id = Some(worker_id);
        Ok(())
    }

    /// Whether a worker with the given capabilities may claim this job
    pub fn acquirable_by(
        &self,
        organization_id: Uuid,
        types: &[ProvisionerType],
        provisioner_tags: &Tags,
    ) -> bool {
        self.status() == JobStatus::Pending
            && self.organization_id == organization_id
            && types.contains(&self.provisioner)
            && self.tags.runnable_by(provisioner_tags)
    }
}
