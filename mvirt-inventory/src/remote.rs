//! Remote inventory access.
//!
//! The remote virtualization environment is reached through the
//! [`RemoteInventory`] trait. [`SnapshotInventory`] implements it over a
//! JSON snapshot of the remote object tree, which is what the daemon and the
//! tests run against.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::EntityKind;

/// Managed object types exposed by the remote environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Datacenter,
    Folder,
    Network,
    DistributedVirtualPortgroup,
    OpaqueNetwork,
    Datastore,
    HostSystem,
    ComputeResource,
    ClusterComputeResource,
    ResourcePool,
    VirtualMachine,
    /// Disk device of a VM; never discovered on its own, see [`RemoteIdentity::disk`].
    VirtualDisk,
}

impl ObjectKind {
    pub const ALL: &'static [ObjectKind] = &[
        ObjectKind::Datacenter,
        ObjectKind::Folder,
        ObjectKind::Network,
        ObjectKind::DistributedVirtualPortgroup,
        ObjectKind::OpaqueNetwork,
        ObjectKind::Datastore,
        ObjectKind::HostSystem,
        ObjectKind::ComputeResource,
        ObjectKind::ClusterComputeResource,
        ObjectKind::ResourcePool,
        ObjectKind::VirtualMachine,
        ObjectKind::VirtualDisk,
    ];

    /// Local entity kind objects of this type are persisted as.
    pub fn entity_kind(self) -> EntityKind {
        match self {
            ObjectKind::Datacenter => EntityKind::Datacenter,
            ObjectKind::Folder => EntityKind::Folder,
            ObjectKind::Network
            | ObjectKind::DistributedVirtualPortgroup
            | ObjectKind::OpaqueNetwork => EntityKind::Network,
            ObjectKind::Datastore => EntityKind::Datastore,
            ObjectKind::HostSystem => EntityKind::Host,
            ObjectKind::ComputeResource | ObjectKind::ClusterComputeResource => {
                EntityKind::ComputeResource
            }
            ObjectKind::ResourcePool => EntityKind::ResourcePool,
            ObjectKind::VirtualMachine => EntityKind::VirtualMachine,
            ObjectKind::VirtualDisk => EntityKind::Disk,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Datacenter => "Datacenter",
            ObjectKind::Folder => "Folder",
            ObjectKind::Network => "Network",
            ObjectKind::DistributedVirtualPortgroup => "DistributedVirtualPortgroup",
            ObjectKind::OpaqueNetwork => "OpaqueNetwork",
            ObjectKind::Datastore => "Datastore",
            ObjectKind::HostSystem => "HostSystem",
            ObjectKind::ComputeResource => "ComputeResource",
            ObjectKind::ClusterComputeResource => "ClusterComputeResource",
            ObjectKind::ResourcePool => "ResourcePool",
            ObjectKind::VirtualMachine => "VirtualMachine",
            ObjectKind::VirtualDisk => "VirtualDisk",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown object kind '{}'", s))
    }
}

/// Names one object in the remote inventory.
///
/// Stable across passes as long as the remote object is not destroyed and
/// recreated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub kind: ObjectKind,
    pub value: String,
}

impl RemoteIdentity {
    pub fn new(kind: ObjectKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Identity of disk device `device_key` attached to `vm`.
    pub fn disk(vm: &RemoteIdentity, device_key: i32) -> Self {
        Self::new(ObjectKind::VirtualDisk, format!("{}:{}", vm.value, device_key))
    }
}

/// Parses the `Kind:value` display form.
impl FromStr for RemoteIdentity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| "Expected format: Kind:value".to_string())?;
        if value.is_empty() {
            return Err("empty object value".to_string());
        }
        Ok(Self::new(kind.parse()?, value))
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Properties fetched for one remote object, keyed by property path.
pub type PropertyBag = BTreeMap<String, serde_json::Value>;

/// Read access to the remote virtualization environment.
#[async_trait]
pub trait RemoteInventory: Send + Sync {
    /// List every object reachable below (and including) `root`.
    async fn discover(&self, root: &RemoteIdentity) -> Result<Vec<RemoteIdentity>>;

    /// Fetch the property bag for one object.
    async fn fetch_properties(&self, id: &RemoteIdentity) -> Result<PropertyBag>;
}

/// One object in an inventory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub id: RemoteIdentity,
    #[serde(default)]
    pub children: Vec<RemoteIdentity>,
    #[serde(default)]
    pub properties: PropertyBag,
}

/// Serialized form of a remote inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub objects: Vec<SnapshotObject>,
}

/// Remote inventory backed by an in-memory snapshot.
pub struct SnapshotInventory {
    objects: HashMap<RemoteIdentity, SnapshotObject>,
}

impl SnapshotInventory {
    pub fn new(snapshot: Snapshot) -> Self {
        let objects = snapshot
            .objects
            .into_iter()
            .map(|o| (o.id.clone(), o))
            .collect();
        Self { objects }
    }

    /// Load a snapshot from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl RemoteInventory for SnapshotInventory {
    async fn discover(&self, root: &RemoteIdentity) -> Result<Vec<RemoteIdentity>> {
        if !self.objects.contains_key(root) {
            return Err(anyhow!("root object {} not found", root));
        }

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root.clone()]);
        let mut found = Vec::new();

        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            // Children may name objects that vanished between listing and
            // traversal; those are simply not reported.
            let Some(object) = self.objects.get(&id) else {
                debug!("Skipping dangling child reference {}", id);
                continue;
            };
            queue.extend(object.children.iter().cloned());
            found.push(id);
        }

        Ok(found)
    }

    async fn fetch_properties(&self, id: &RemoteIdentity) -> Result<PropertyBag> {
        self.objects
            .get(id)
            .map(|o| o.properties.clone())
            .ok_or_else(|| anyhow!("object {} not found", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(kind: ObjectKind, value: &str, children: Vec<RemoteIdentity>) -> SnapshotObject {
        SnapshotObject {
            id: RemoteIdentity::new(kind, value),
            children,
            properties: PropertyBag::from([("name".to_string(), json!(value))]),
        }
    }

    #[tokio::test]
    async fn test_discover_walks_children_once() {
        let dc = RemoteIdentity::new(ObjectKind::Datacenter, "datacenter-2");
        let folder = RemoteIdentity::new(ObjectKind::Folder, "group-h4");
        let host = RemoteIdentity::new(ObjectKind::HostSystem, "host-10");
        let inventory = SnapshotInventory::new(Snapshot {
            objects: vec![
                object(ObjectKind::Datacenter, "datacenter-2", vec![folder.clone(), host.clone()]),
                object(ObjectKind::Folder, "group-h4", vec![host.clone()]),
                object(ObjectKind::HostSystem, "host-10", vec![]),
            ],
        });

        let found = inventory.discover(&dc).await.unwrap();
        assert_eq!(found, vec![dc, folder, host]);
    }

    #[tokio::test]
    async fn test_discover_skips_dangling_children() {
        let dc = RemoteIdentity::new(ObjectKind::Datacenter, "datacenter-2");
        let ghost = RemoteIdentity::new(ObjectKind::VirtualMachine, "vm-gone");
        let inventory = SnapshotInventory::new(Snapshot {
            objects: vec![object(ObjectKind::Datacenter, "datacenter-2", vec![ghost])],
        });

        let found = inventory.discover(&dc).await.unwrap();
        assert_eq!(found, vec![dc]);
    }

    #[tokio::test]
    async fn test_unknown_root_fails() {
        let inventory = SnapshotInventory::new(Snapshot::default());
        let root = RemoteIdentity::new(ObjectKind::Folder, "group-d1");
        assert!(inventory.discover(&root).await.is_err());
        assert!(inventory.fetch_properties(&root).await.is_err());
    }

    #[test]
    fn test_identity_serde_shape() {
        let id = RemoteIdentity::new(ObjectKind::HostSystem, "host-10");
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value, json!({"kind": "HostSystem", "value": "host-10"}));
        assert_eq!(id.to_string(), "HostSystem:host-10");
        assert_eq!("HostSystem:host-10".parse::<RemoteIdentity>().unwrap(), id);
        assert!("Spaceship:x-1".parse::<RemoteIdentity>().is_err());
        assert!("HostSystem".parse::<RemoteIdentity>().is_err());
    }
}
