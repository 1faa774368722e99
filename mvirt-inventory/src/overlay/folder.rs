//! Datacenter and folder overlays.

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct DatacenterOverlay {
    object: ObjectOverlay,
}

impl DatacenterOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::Datacenter];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }
}

impl Overlay for DatacenterOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}

#[derive(Debug)]
pub struct FolderOverlay {
    object: ObjectOverlay,
}

impl FolderOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[ObjectKind::Folder];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }

    /// Containing folder or datacenter. Root folders have none.
    pub fn parent(&self) -> Option<RemoteIdentity> {
        self.object.optional("parent")
    }
}

impl Overlay for FolderOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
