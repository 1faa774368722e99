//! Stable local resource keys.
//!
//! Keys are derived from the remote identity and the owning endpoint, so
//! every pass arrives at the same key for the same remote object and an
//! upsert replaces a create.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::RemoteIdentity;

/// Namespace for resource key UUIDs.
const KEY_NAMESPACE: Uuid = Uuid::from_u128(0x6d76_6972_742d_696e_7665_6e74_6f72_7931);

/// Identifier of a persisted resource, e.g. `/resources/hosts/<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalKey(String);

impl LocalKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection segment of the key, if it has the usual layout.
    pub fn collection(&self) -> Option<&str> {
        self.0.strip_prefix("/resources/")?.split('/').next()
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocalKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Derive the local key for a remote object owned by `endpoint_link`.
pub fn derive_key(id: &RemoteIdentity, endpoint_link: &str) -> LocalKey {
    // The endpoint is length-prefixed and kind names never contain ':', so
    // distinct (endpoint, kind, value) triples never produce the same name.
    let name = format!(
        "{}:{}{}:{}",
        endpoint_link.len(),
        endpoint_link,
        id.kind,
        id.value
    );
    let uuid = Uuid::new_v5(&KEY_NAMESPACE, name.as_bytes());
    LocalKey(format!("/resources/{}/{}", id.kind.entity_kind().collection(), uuid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ObjectKind;

    const ENDPOINT: &str = "/resources/endpoints/vc-1";

    #[test]
    fn test_derive_key_is_stable() {
        let id = RemoteIdentity::new(ObjectKind::HostSystem, "host-10");
        let a = derive_key(&id, ENDPOINT);
        let b = derive_key(&id.clone(), ENDPOINT);
        assert_eq!(a, b);
        assert_eq!(a.collection(), Some("hosts"));
    }

    #[test]
    fn test_derive_key_differs_per_identity_and_endpoint() {
        let host = RemoteIdentity::new(ObjectKind::HostSystem, "host-10");
        let other = RemoteIdentity::new(ObjectKind::HostSystem, "host-11");
        let cluster = RemoteIdentity::new(ObjectKind::ClusterComputeResource, "host-10");

        let base = derive_key(&host, ENDPOINT);
        assert_ne!(base, derive_key(&other, ENDPOINT));
        assert_ne!(base, derive_key(&cluster, ENDPOINT));
        assert_ne!(base, derive_key(&host, "/resources/endpoints/vc-2"));
    }

    #[test]
    fn test_network_kinds_share_collection() {
        let pg = RemoteIdentity::new(ObjectKind::DistributedVirtualPortgroup, "dvportgroup-7");
        let net = RemoteIdentity::new(ObjectKind::Network, "network-7");
        assert_eq!(derive_key(&pg, ENDPOINT).collection(), Some("networks"));
        assert_eq!(derive_key(&net, ENDPOINT).collection(), Some("networks"));
    }

    #[test]
    fn test_disk_keys() {
        let vm = RemoteIdentity::new(ObjectKind::VirtualMachine, "vm-42");
        let d1 = derive_key(&RemoteIdentity::disk(&vm, 2000), ENDPOINT);
        let d2 = derive_key(&RemoteIdentity::disk(&vm, 2001), ENDPOINT);
        assert_eq!(d1, derive_key(&RemoteIdentity::disk(&vm, 2000), ENDPOINT));
        assert_ne!(d1, d2);
        assert_eq!(d1.collection(), Some("disks"));
    }
}
