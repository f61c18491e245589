// Worker Registration - validated capability set of one provisioner daemon

use crate::domain::{DomainKey, ProvisionerType, Tags};
use crate::error::Result;
use uuid::Uuid;

/// Capabilities a worker acquires jobs with.
///
/// Built once when the worker connects. Tags are normalized with
/// [`Tags::mutate_provisioner`] so a worker that declares no scope lines up
/// with untagged jobs, and validated here so that a bad tag set is a setup
/// error rather than something every acquire call has to handle.
#[derive(Debug, Clone)]
pub struct WorkerRegistration {
    organization_id: Uuid,
    worker_id: Uuid,
    provisioner_types: Vec<ProvisionerType>,
    tags: Tags,
    domain_key: DomainKey,
    tags_json: String,
}

impl WorkerRegistration {
    pub fn new(
        organization_id: Uuid,
        worker_id: Uuid,
        provisioner_types: Vec<ProvisionerType>,
        tags: Tags,
    ) -> Result<Self> {
        let tags = Tags::mutate_provisioner(&tags);
        tags.validate()?;
        let domain_key = DomainKey::new(organization_id, &provisioner_types, &tags);
        let tags_json = tags.to_json()?;
        Ok(Self {
            organization_id,
            worker_id,
            provisioner_types,
            tags,
            domain_key,
            tags_json,
        })
    }

    pub fn organization_id(&self) -> Uuid {
        self.organization_id
    }

    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    pub fn provisioner_types(&self) -> &[ProvisionerType] {
        &self.provisioner_types
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn domain_key(&self) -> &DomainKey {
        &self.domain_key
    }

    pub fn tags_json(&self) -> &str {
        &self.tags_json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use crate::error::AppError;

    #[test]
    fn test_registration_rejects_nul_tags() {
        let result = WorkerRegistration::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![ProvisionerType::Echo],
            Tags::from([("environment", "on\0prem")]),
        );
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::TagsContainNullByte))
        ));
    }

    #[test]
    fn test_workers_with_same_capabilities_share_domain() {
        let org = Uuid::new_v4();
        let a = WorkerRegistration::new(
            org,
            Uuid::new_v4(),
            vec![ProvisionerType::Terraform, ProvisionerType::Echo],
            Tags::from([("environment", "on-prem")]),
        )
        .unwrap();
        let b = WorkerRegistration::new(
            org,
            Uuid::new_v4(),
            vec![ProvisionerType::Echo, ProvisionerType::Terraform],
            Tags::from([("environment", "on-prem")]),
        )
        .unwrap();
        assert_eq!(a.domain_key(), b.domain_key());
        assert_eq!(
            a.tags_json(),
            r#"{"environment":"on-prem","owner":"","scope":"organization"}"#
        );
    }

    #[test]
    fn test_empty_tags_register_as_untagged() {
        let org = Uuid::new_v4();
        let bare = WorkerRegistration::new(
            org,
            Uuid::new_v4(),
            vec![ProvisionerType::Echo],
            Tags::new(),
        )
        .unwrap();
        let untagged = WorkerRegistration::new(
            org,
            Uuid::new_v4(),
            vec![ProvisionerType::Echo],
            Tags::untagged(),
        )
        .unwrap();
        assert_eq!(bare.tags(), &Tags::untagged());
        assert_eq!(bare.domain_key(), untagged.domain_key());
        assert_eq!(bare.tags_json(), r#"{"owner":"","scope":"organization"}"#);
    }
}
