//! Host overlay.

use std::sync::OnceLock;

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct HostOverlay {
    object: ObjectOverlay,
    /// Set once per pass, after cluster overlays are known.
    clustered: OnceLock<bool>,
}

impl HostOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::HostSystem];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
            clustered: OnceLock::new(),
        })
    }

    /// Owning compute resource (standalone wrapper or cluster).
    pub fn parent(&self) -> Result<RemoteIdentity> {
        self.required("parent")
    }

    pub fn cpu_cores(&self) -> Result<u32> {
        self.required("hardware.cpuInfo.numCpuCores")
    }

    pub fn cpu_mhz(&self) -> u64 {
        self.defaulted("summary.hardware.cpuMhz", 0)
    }

    pub fn memory_bytes(&self) -> Result<u64> {
        self.required("hardware.memorySize")
    }

    pub fn connection_state(&self) -> String {
        self.defaulted("runtime.connectionState", "connected".to_string())
    }

    pub fn power_state(&self) -> String {
        self.defaulted("runtime.powerState", "unknown".to_string())
    }

    /// Record cluster membership. Panics if already recorded.
    pub fn mark_clustered(&self, clustered: bool) {
        assert!(
            self.clustered.set(clustered).is_ok(),
            "cluster membership of {} set twice",
            self.identity()
        );
    }

    /// Cluster membership; `false` until marked.
    pub fn is_clustered(&self) -> bool {
        self.clustered.get().copied().unwrap_or(false)
    }
}

impl Overlay for HostOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host() -> HostOverlay {
        let bag = PropertyBag::from([
            ("name".to_string(), json!("esx-1")),
            ("hardware.memorySize".to_string(), json!(68719476736u64)),
        ]);
        HostOverlay::new(bag, RemoteIdentity::new(ObjectKind::HostSystem, "host-10")).unwrap()
    }

    #[test]
    fn test_defaults_for_sparse_host() {
        let host = host();
        assert_eq!(host.memory_bytes().unwrap(), 68719476736);
        assert!(host.cpu_cores().is_err());
        assert_eq!(host.connection_state(), "connected");
        assert!(!host.is_clustered());
    }

    #[test]
    fn test_mark_clustered_once() {
        let host = host();
        host.mark_clustered(true);
        assert!(host.is_clustered());
    }

    #[test]
    #[should_panic(expected = "set twice")]
    fn test_mark_clustered_twice_panics() {
        let host = host();
        host.mark_clustered(true);
        host.mark_clustered(false);
    }
}
