//! Property overlays - typed read views over one remote object's properties.
//!
//! The remote side returns a flat bag of property paths, and which paths are
//! populated varies between objects of the same kind (a disconnected
//! datastore has no free space, a standalone host has no cluster). Overlays
//! keep the "is this field mandatory here" decisions in one place:
//! [`Overlay::required`] fails with a typed error, [`Overlay::defaulted`]
//! never fails.

mod compute;
mod datastore;
mod folder;
mod host;
mod network;
mod resource_pool;
mod vm;

use serde::de::DeserializeOwned;

use crate::document::EntityKind;
use crate::error::{Result, SyncError};
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

pub use compute::ComputeResourceOverlay;
pub use datastore::DatastoreOverlay;
pub use folder::{DatacenterOverlay, FolderOverlay};
pub use host::HostOverlay;
pub use network::NetworkOverlay;
pub use resource_pool::ResourcePoolOverlay;
pub use vm::{VirtualDisk, VmOverlay};

/// Property bag plus the identity it was fetched for.
#[derive(Debug, Clone)]
pub struct ObjectOverlay {
    identity: RemoteIdentity,
    bag: PropertyBag,
}

impl ObjectOverlay {
    /// Wrap `bag`, refusing identities whose kind is not in `accepted`.
    pub fn new(
        bag: PropertyBag,
        identity: RemoteIdentity,
        accepted: &'static [ObjectKind],
    ) -> Result<Self> {
        if !accepted.contains(&identity.kind) {
            return Err(SyncError::TypeMismatch {
                identity,
                expected: accepted,
            });
        }
        Ok(Self { identity, bag })
    }

    pub fn identity(&self) -> &RemoteIdentity {
        &self.identity
    }

    pub fn required<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        match self.bag.get(path) {
            None | Some(serde_json::Value::Null) => Err(SyncError::MissingProperty {
                identity: self.identity.clone(),
                path: path.to_string(),
            }),
            Some(value) => {
                serde_json::from_value(value.clone()).map_err(|e| SyncError::InvalidProperty {
                    identity: self.identity.clone(),
                    path: path.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn defaulted<T: DeserializeOwned>(&self, path: &str, fallback: T) -> T {
        self.optional(path).unwrap_or(fallback)
    }

    /// Present and readable as `T`, or `None`.
    pub fn optional<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        match self.bag.get(path) {
            None | Some(serde_json::Value::Null) => None,
            Some(value) => serde_json::from_value(value.clone()).ok(),
        }
    }
}

/// Accessors shared by every overlay kind.
pub trait Overlay {
    fn object(&self) -> &ObjectOverlay;

    fn identity(&self) -> &RemoteIdentity {
        self.object().identity()
    }

    fn required<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.object().required(path)
    }

    fn defaulted<T: DeserializeOwned>(&self, path: &str, fallback: T) -> T {
        self.object().defaulted(path, fallback)
    }

    fn name(&self) -> Result<String> {
        self.required("name")
    }
}

/// Any overlay, as held in the pass context.
#[derive(Debug)]
pub enum AnyOverlay {
    Datacenter(DatacenterOverlay),
    Folder(FolderOverlay),
    Network(NetworkOverlay),
    Datastore(DatastoreOverlay),
    Host(HostOverlay),
    ComputeResource(ComputeResourceOverlay),
    ResourcePool(ResourcePoolOverlay),
    Vm(VmOverlay),
}

impl AnyOverlay {
    /// Kinds an overlay can be built for.
    pub const DISCOVERABLE: &'static [ObjectKind] = &[
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
    ];

    /// Build the overlay matching the identity's kind.
    pub fn from_bag(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(match identity.kind {
            ObjectKind::Datacenter => AnyOverlay::Datacenter(DatacenterOverlay::new(bag, identity)?),
            ObjectKind::Folder => AnyOverlay::Folder(FolderOverlay::new(bag, identity)?),
            ObjectKind::Network
            | ObjectKind::DistributedVirtualPortgroup
            | ObjectKind::OpaqueNetwork => AnyOverlay::Network(NetworkOverlay::new(bag, identity)?),
            ObjectKind::Datastore => AnyOverlay::Datastore(DatastoreOverlay::new(bag, identity)?),
            ObjectKind::HostSystem => AnyOverlay::Host(HostOverlay::new(bag, identity)?),
            ObjectKind::ComputeResource | ObjectKind::ClusterComputeResource => {
                AnyOverlay::ComputeResource(ComputeResourceOverlay::new(bag, identity)?)
            }
            ObjectKind::ResourcePool => {
                AnyOverlay::ResourcePool(ResourcePoolOverlay::new(bag, identity)?)
            }
            ObjectKind::VirtualMachine => AnyOverlay::Vm(VmOverlay::new(bag, identity)?),
            ObjectKind::VirtualDisk => {
                return Err(SyncError::TypeMismatch {
                    identity,
                    expected: Self::DISCOVERABLE,
                });
            }
        })
    }

    pub fn object(&self) -> &ObjectOverlay {
        match self {
            AnyOverlay::Datacenter(o) => o.object(),
            AnyOverlay::Folder(o) => o.object(),
            AnyOverlay::Network(o) => o.object(),
            AnyOverlay::Datastore(o) => o.object(),
            AnyOverlay::Host(o) => o.object(),
            AnyOverlay::ComputeResource(o) => o.object(),
            AnyOverlay::ResourcePool(o) => o.object(),
            AnyOverlay::Vm(o) => o.object(),
        }
    }

    pub fn identity(&self) -> &RemoteIdentity {
        self.object().identity()
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.identity().kind.entity_kind()
    }

    pub fn name(&self) -> Result<String> {
        self.object().required("name")
    }

    pub fn as_host(&self) -> Option<&HostOverlay> {
        match self {
            AnyOverlay::Host(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_compute(&self) -> Option<&ComputeResourceOverlay> {
        match self {
            AnyOverlay::ComputeResource(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_resource_pool(&self) -> Option<&ResourcePoolOverlay> {
        match self {
            AnyOverlay::ResourcePool(o) => Some(o),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(pairs: &[(&str, serde_json::Value)]) -> PropertyBag {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_wrong_kind_is_type_mismatch() {
        let id = RemoteIdentity::new(ObjectKind::Datastore, "datastore-1");
        let err = HostOverlay::new(bag(&[("name", json!("esx-1"))]), id).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
    }

    #[test]
    fn test_required_missing_and_invalid() {
        let id = RemoteIdentity::new(ObjectKind::Folder, "group-v3");
        let overlay = ObjectOverlay::new(
            bag(&[("name", json!("vm")), ("childType", json!(42)), ("gone", json!(null))]),
            id,
            &[ObjectKind::Folder],
        )
        .unwrap();

        assert_eq!(overlay.required::<String>("name").unwrap(), "vm");
        assert!(matches!(
            overlay.required::<String>("missing"),
            Err(SyncError::MissingProperty { .. })
        ));
        assert!(matches!(
            overlay.required::<String>("gone"),
            Err(SyncError::MissingProperty { .. })
        ));
        assert!(matches!(
            overlay.required::<Vec<String>>("childType"),
            Err(SyncError::InvalidProperty { .. })
        ));
    }

    #[test]
    fn test_defaulted_never_fails() {
        let id = RemoteIdentity::new(ObjectKind::Folder, "group-v3");
        let overlay =
            ObjectOverlay::new(bag(&[("count", json!("nope"))]), id, &[ObjectKind::Folder]).unwrap();
        assert_eq!(overlay.defaulted("count", 7u32), 7);
        assert_eq!(overlay.defaulted("absent", "x".to_string()), "x");
    }

    #[test]
    fn test_from_bag_dispatches_on_kind() {
        let id = RemoteIdentity::new(ObjectKind::ClusterComputeResource, "domain-c7");
        let overlay = AnyOverlay::from_bag(bag(&[("name", json!("cluster-a"))]), id).unwrap();
        assert!(overlay.as_compute().is_some());
        assert_eq!(overlay.entity_kind(), EntityKind::ComputeResource);
        assert_eq!(overlay.name().unwrap(), "cluster-a");
    }

    #[test]
    fn test_disks_have_no_overlay() {
        let vm = RemoteIdentity::new(ObjectKind::VirtualMachine, "vm-42");
        let err = AnyOverlay::from_bag(PropertyBag::new(), RemoteIdentity::disk(&vm, 2000)).unwrap_err();
        assert!(matches!(err, SyncError::TypeMismatch { .. }));
    }
}
