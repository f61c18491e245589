// Domain Key - canonical partition key for acquisition traffic

use super::job::ProvisionerType;
use super::tags::Tags;
use uuid::Uuid;

const DELIMITER: char = '\0';

/// Canonical key for a set of capabilities (organization, provisioner types, tags).
///
/// Workers with equal capabilities map to the same key regardless of the order
/// their provisioner types or tags were given in. The NUL byte delimits every
/// component; it cannot appear in a tag key or value once the tags passed
/// [`Tags::validate`], so no two distinct capability sets share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainKey(String);

impl DomainKey {
    pub fn new(organization_id: Uuid, provisioner_types: &[ProvisionerType], tags: &Tags) -> Self {
        let mut key = String::new();
        key.push_str(&organization_id.to_string());
        key.push(DELIMITER);

        // sort a copy, callers keep their own order
        let mut types = provisioner_types.to_vec();
        types.sort();
        for t in types {
            key.push_str(t.as_str());
            key.push(DELIMITER);
        }
        key.push(DELIMITER);

        // Tags iterate in sorted key order
        for (k, v) in tags.iter() {
            key.push_str(k);
            key.push(DELIMITER);
            key.push_str(v);
            key.push(DELIMITER);
        }
        Self(key)
    }
}
