//! Datastore overlay.

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct DatastoreOverlay {
    object: ObjectOverlay,
}

impl DatastoreOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::Datastore];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }

    pub fn parent(&self) -> Option<RemoteIdentity> {
        self.object.optional("parent")
    }

    pub fn capacity_bytes(&self) -> Result<u64> {
        self.required("summary.capacity")
    }

    /// Absent while the datastore is disconnected.
    pub fn free_bytes(&self) -> Option<u64> {
        self.object.optional("summary.freeSpace")
    }

    pub fn is_accessible(&self) -> bool {
        self.defaulted("summary.accessible", true)
    }
}

impl Overlay for DatastoreOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
