//! Persisted resource documents.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::key::LocalKey;
use crate::remote::RemoteIdentity;

/// Kinds of local resources the sync maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Datacenter,
    Folder,
    Network,
    Datastore,
    Host,
    ComputeResource,
    ResourcePool,
    VirtualMachine,
    Disk,
}

impl EntityKind {
    /// Store collection documents of this kind live under.
    pub fn collection(self) -> &'static str {
        match self {
            EntityKind::Datacenter => "datacenters",
            EntityKind::Folder => "folders",
            EntityKind::Network => "networks",
            EntityKind::Datastore => "datastores",
            EntityKind::Host => "hosts",
            EntityKind::ComputeResource => "compute",
            EntityKind::ResourcePool => "resource-pools",
            EntityKind::VirtualMachine => "vms",
            EntityKind::Disk => "disks",
        }
    }

    /// Leaf workload units are deleted outright when orphaned.
    pub fn is_leaf(self) -> bool {
        matches!(self, EntityKind::VirtualMachine | EntityKind::Disk)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Datacenter => "datacenter",
            EntityKind::Folder => "folder",
            EntityKind::Network => "network",
            EntityKind::Datastore => "datastore",
            EntityKind::Host => "host",
            EntityKind::ComputeResource => "compute_resource",
            EntityKind::ResourcePool => "resource_pool",
            EntityKind::VirtualMachine => "vm",
            EntityKind::Disk => "disk",
        };
        f.write_str(s)
    }
}

/// Lifecycle of a local resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Active,
    /// Gone from the remote side but still referenced locally.
    Retired,
}

/// Power state of a compute-like resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Suspended,
    #[default]
    Unknown,
}

impl PowerState {
    /// Map a remote power state string (`poweredOn`, `poweredOff`, ...).
    pub fn from_remote(state: &str) -> Self {
        match state {
            "poweredOn" => PowerState::On,
            "poweredOff" | "standBy" => PowerState::Off,
            "suspended" => PowerState::Suspended,
            _ => PowerState::Unknown,
        }
    }
}

/// Capacity figures; which ones are set depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_mhz: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_bytes: Option<u64>,
}

/// Scope a pass runs in: which endpoint it syncs, on behalf of whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassScope {
    /// Link of the endpoint the remote inventory belongs to.
    pub endpoint_link: String,
    pub tenant_links: Vec<String>,
    pub region_id: Option<String>,
}

/// A local resource as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub key: LocalKey,
    pub kind: EntityKind,
    pub name: String,
    pub endpoint_link: String,
    #[serde(default)]
    pub tenant_links: Vec<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub remote_id: RemoteIdentity,
    /// Containing resource (folder, cluster, pool).
    #[serde(default)]
    pub parent_link: Option<LocalKey>,
    /// Resource this one is placed on (host, cluster, datastore).
    #[serde(default)]
    pub placement_link: Option<LocalKey>,
    #[serde(default)]
    pub lifecycle: LifecycleState,
    #[serde(default)]
    pub power_state: PowerState,
    #[serde(default)]
    pub capacity: Capacity,
    pub created_at: String,
    pub updated_at: String,
}

impl ResourceDocument {
    /// Fresh desired-state document for a remote object in `scope`.
    pub fn desired(
        key: LocalKey,
        kind: EntityKind,
        name: impl Into<String>,
        scope: &PassScope,
        remote_id: RemoteIdentity,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            key,
            kind,
            name: name.into(),
            endpoint_link: scope.endpoint_link.clone(),
            tenant_links: scope.tenant_links.clone(),
            region_id: scope.region_id.clone(),
            remote_id,
            parent_link: None,
            placement_link: None,
            lifecycle: LifecycleState::Active,
            power_state: PowerState::Unknown,
            capacity: Capacity::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Carry the identity of an already persisted document forward.
    pub fn carry_forward(mut self, existing: &ResourceDocument) -> Self {
        self.key = existing.key.clone();
        self.created_at = existing.created_at.clone();
        self
    }

    /// Mark as retired: terminal lifecycle plus power-off.
    pub fn retire(&mut self) {
        self.lifecycle = LifecycleState::Retired;
        self.power_state = PowerState::Off;
        self.updated_at = Utc::now().to_rfc3339();
    }
}
