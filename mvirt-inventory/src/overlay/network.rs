//! Network overlay (standard, distributed portgroup, opaque).

use super::{ObjectOverlay, Overlay};
use crate::error::Result;
use crate::remote::{ObjectKind, PropertyBag, RemoteIdentity};

#[derive(Debug)]
pub struct NetworkOverlay {
    object: ObjectOverlay,
}

impl NetworkOverlay {
    pub const ACCEPTED: &'static [ObjectKind] = &[
        ObjectKind::Network,
        ObjectKind::DistributedVirtualPortgroup,
        ObjectKind::OpaqueNetwork,
    ];

    pub fn new(bag: PropertyBag, identity: RemoteIdentity) -> Result<Self> {
        Ok(Self {
            object: ObjectOverlay::new(bag, identity, Self::ACCEPTED)?,
        })
    }

    pub fn parent(&self) -> Option<RemoteIdentity> {
        self.object.optional("parent")
    }
}

impl Overlay for NetworkOverlay {
    fn object(&self) -> &ObjectOverlay {
        &self.object
    }
}
