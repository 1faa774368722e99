//! Compute resource overlay (standalone host wrapper or cluster).

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct ComputeResourceOverlay {
    object: ObjectOverlay,
}

impl ComputeResourceOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[
        ObjectKind::ComputeResource,
        ObjectKind::ClusterComputeResource,
    ];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }

    pub fn is_cluster(&self) -> bool {
        self.identity().kind == ObjectKind::ClusterComputeResource
    }

    pub fn parent(&self) -> Option<RemoteIdentity> {
        self.object.optional("parent")
    }

    /// Member hosts.
    pub fn hosts(&self) -> Vec<RemoteIdentity> {
        self.defaulted("host", Vec::new())
    }

    pub fn cpu_cores(&self) -> u32 {
        self.defaulted("summary.numCpuCores", 0)
    }

    pub fn effective_cpu_mhz(&self) -> u64 {
        self.defaulted("summary.effectiveCpu", 0)
    }

    /// Effective memory, reported by the remote side in MiB.
    pub fn effective_memory_bytes(&self) -> u64 {
        self.defaulted::<u64>("summary.effectiveMemory", 0)
            .saturating_mul(1024 * 1024)
    }
}

impl Overlay for ComputeResourceOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
