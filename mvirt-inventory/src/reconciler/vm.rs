//! Virtual machine reconciler, including the VM's disks.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{Applied, Reconciler, Tally, mismatch, read_existing, write};
use crate::context::EnumerationContext;
use crate::document::{Capacity, EntityKind, PowerState, ResourceDocument};
use crate::error::Result;
use crate::key::LocalKey;
use crate::overlay::{AnyOverlay, Overlay, VirtualDisk, VmOverlay};
use crate::remote::RemoteIdentity;
use crate::store::ResourceStore;

pub struct VmReconciler;

#[async_trait]
impl Reconciler for VmReconciler {
    async fn desired(
        &self,
        ctx: &EnumerationContext,
        overlay: &AnyOverlay,
        key: LocalKey,
    ) -> Result<ResourceDocument> {
        let AnyOverlay::Vm(vm) = overlay else {
            return Err(mismatch(overlay, VmOverlay::ACCEPTED));
        };

        let mut doc = ResourceDocument::desired(
            key,
            EntityKind::VirtualMachine,
            vm.name()?,
            ctx.scope(),
            vm.identity().clone(),
        );
        let storage: u64 = vm.disks().iter().map(|d| d.capacity_in_bytes).sum();
        doc.capacity = Capacity {
            cpu_count: Some(vm.cpu_count()),
            memory_bytes: Some(vm.memory_bytes()),
            storage_bytes: Some(storage),
            ..Default::default()
        };
        doc.power_state = if vm.is_template() {
            PowerState::Off
        } else {
            PowerState::from_remote(&vm.power_state())
        };

        if let Some(pool) = vm.resource_pool() {
            doc.parent_link = ctx.resolve_link(&pool).await;
        }
        if let Some(host) = vm.host() {
            doc.placement_link = ctx.resolve_link(&host).await;
        }
        Ok(doc)
    }

    async fn reconcile_owned(
        &self,
        ctx: &EnumerationContext,
        store: &dyn ResourceStore,
        overlay: &AnyOverlay,
        owner: &LocalKey,
    ) -> Tally {
        let AnyOverlay::Vm(vm) = overlay else {
            return Tally::default();
        };

        let mut tally = Tally::default();
        for disk in vm.disks() {
            let id = RemoteIdentity::disk(vm.identity(), disk.key);
            let key = ctx.key_for(&id);
            match upsert_disk(ctx, store, &id, &key, &disk, owner).await {
                Ok(applied) => {
                    if applied == Applied::Created {
                        info!("Created disk {} at {}", id, key);
                    }
                    ctx.touch(&key);
                    tally += Tally::applied(applied);
                }
                Err(e) => {
                    warn!("Failed to reconcile disk {}: {}", id, e);
                    ctx.defer(&key);
                    tally += Tally::error();
                }
            }
        }
        tally
    }
}

async fn upsert_disk(
    ctx: &EnumerationContext,
    store: &dyn ResourceStore,
    id: &RemoteIdentity,
    key: &LocalKey,
    disk: &VirtualDisk,
    vm_key: &LocalKey,
) -> Result<Applied> {
    let existing = read_existing(store, id, key).await?;

    let name = if disk.label.is_empty() {
        format!("disk-{}", disk.key)
    } else {
        disk.label.clone()
    };
    let mut doc = ResourceDocument::desired(key.clone(), EntityKind::Disk, name, ctx.scope(), id.clone());
    doc.capacity = Capacity {
        storage_bytes: Some(disk.capacity_in_bytes),
        ..Default::default()
    };
    doc.parent_link = Some(vm_key.clone());
    if let Some(datastore) = &disk.datastore {
        doc.placement_link = ctx.resolve_link(datastore).await;
    }

    write(store, id, doc, existing.as_ref()).await
}
