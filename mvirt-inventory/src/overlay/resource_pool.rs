//! Resource pool overlay.

use std::sync::OnceLock;

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct ResourcePoolOverlay {
    object: ObjectOverlay,
    owner_name: OnceLock<String>,
}

impl ResourcePoolOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::ResourcePool];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
            owner_name: OnceLock::new(),
        })
    }

    /// Compute resource the pool carves capacity out of.
    pub fn owner(&self) -> Result<RemoteIdentity> {
        self.required("owner")
    }

    /// CPU limit in MHz; -1 means unlimited.
    pub fn cpu_limit_mhz(&self) -> i64 {
        self.defaulted("config.cpuAllocation.limit", -1)
    }

    /// Memory limit in MiB; -1 means unlimited.
    pub fn memory_limit_mb(&self) -> i64 {
        self.defaulted("config.memoryAllocation.limit", -1)
    }

    /// Attach the owning compute resource's name. Panics if already attached.
    pub fn attach_owner_name(&self, name: String) {
        assert!(
            self.owner_name.set(name).is_ok(),
            "owner name of {} set twice",
            self.identity()
        );
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner_name.get().map(String::as_str)
    }

    /// `"<owner>/<pool>"` when the owner is known, else the pool name.
    pub fn qualified_name(&self) -> Result<String> {
        let name = self.name()?;
        Ok(match self.owner_name() {
            Some(owner) => format!("{}/{}", owner, name),
            None => name,
        })
    }
}

impl Overlay for ResourcePoolOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
