//! Virtual machine overlay.

use serde::{Deserialize, Serialize};

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

/// Disk device attached to a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDisk {
    /// Device key, unique within the VM.
    pub key: i32,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub datastore: Option<RemoteIdentity>,
    #[serde(default)]
    pub capacity_in_bytes: u64,
}

#[derive(Debug)]
pub struct VmOverlay {
    object: ObjectOverlay,
}

impl VmOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::VirtualMachine];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }

    /// Host currently running the VM; absent while powered off on some setups.
    pub fn host(&self) -> Option<RemoteIdentity> {
        self.object.optional("runtime.host")
    }

    pub fn resource_pool(&self) -> Option<RemoteIdentity> {
        self.object.optional("resourcePool")
    }

    pub fn power_state(&self) -> String {
        self.defaulted("runtime.powerState", "unknown".to_string())
    }

    pub fn cpu_count(&self) -> u32 {
        self.defaulted("config.hardware.numCPU", 0)
    }

    pub fn memory_bytes(&self) -> u64 {
        self.defaulted::<u64>("config.hardware.memoryMB", 0)
            .saturating_mul(1024 * 1024)
    }

    pub fn is_template(&self) -> bool {
        self.defaulted("config.template", false)
    }

    pub fn disks(&self) -> Vec<VirtualDisk> {
        self.defaulted("config.hardware.disks", Vec::new())
    }
}

impl Overlay for VmOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
