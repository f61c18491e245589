// Provisioner Tags

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Well-known tag naming the scope of a provisioner or job
pub const TAG_SCOPE: &str = "scope";
/// Well-known tag naming the owning user of a user-scoped provisioner or job
pub const TAG_OWNER: &str = "owner";

pub const SCOPE_ORGANIZATION: &str = "organization";
pub const SCOPE_USER: &str = "user";

/// Capability tags of a provisioner daemon, or requirement tags of a job.
///
/// Backed by a `BTreeMap` so iteration and JSON serialization are always in
/// sorted key order. The NUL byte (0x00) is reserved as the delimiter of
/// domain keys and must not appear in keys or values; call [`Tags::validate`]
/// before handing tags to the acquirer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The tag set a job or provisioner gets when nothing is specified
    pub fn untagged() -> Self {
        Self::from([(TAG_SCOPE, SCOPE_ORGANIZATION), (TAG_OWNER, "")])
    }

    /// Normalize user-provided tags, filling in `scope` and `owner`.
    ///
    /// - missing scope: organization-scoped, owner cleared
    /// - `scope=user`: owner is set to `user_id`
    /// - `scope=organization`: owner cleared
    /// - unknown scope: reset to organization-scoped
    pub fn mutate(user_id: Uuid, provided: &Tags) -> Self {
        Self::normalize(provided, |_| user_id.to_string())
    }

    /// Normalize the tags a provisioner daemon registers with.
    ///
    /// Same rules as [`Tags::mutate`], except that a user-scoped provisioner
    /// keeps the owner it declares (empty if it declares none).
    pub fn mutate_provisioner(provided: &Tags) -> Self {
        Self::normalize(provided, |tags| {
            tags.get(TAG_OWNER).unwrap_or_default().to_string()
        })
    }

    fn normalize(provided: &Tags, user_owner: impl FnOnce(&Tags) -> String) -> Self {
        let mut tags = provided.clone();
        let scope = tags.get(TAG_SCOPE).map(str::to_owned);
        match scope.as_deref() {
            Some(SCOPE_USER) => {
                let owner = user_owner(&tags);
                tags.insert(TAG_OWNER, owner);
            }
            Some(SCOPE_ORGANIZATION) => {
                tags.insert(TAG_OWNER, "");
            }
            _ => {
                tags.insert(TAG_SCOPE, SCOPE_ORGANIZATION);
                tags.insert(TAG_OWNER, "");
            }
        }
        tags
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(key, value)` pairs in sorted key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reject tags containing the NUL byte in any key or value
    pub fn validate(&self) -> Result<()> {
        let contains_nul = self
            .0
            .iter()
            .any(|(k, v)| k.as_bytes().contains(&0x00) || v.as_bytes().contains(&0x00));
        if contains_nul {
            return Err(DomainError::TagsContainNullByte);
        }
        Ok(())
    }

    /// Canonical JSON object (sorted keys)
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// True if every tag in `self` is present in `other` with the same value
    pub fn is_subset_of(&self, other: &Tags) -> bool {
        self.0
            .iter()
            .all(|(k, v)| other.0.get(k).is_some_and(|ov| ov == v))
    }

    /// Whether a job carrying these tags may run on a provisioner with
    /// `provisioner` tags.
    ///
    /// Untagged jobs only run on untagged provisioners. Any other job runs on
    /// a provisioner whose tags are a superset of the job's tags.
    pub fn runnable_by(&self, provisioner: &Tags) -> bool {
        if *self == Self::untagged() {
            return self == provisioner;
        }
        self.is_subset_of(provisioner)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Tags {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
