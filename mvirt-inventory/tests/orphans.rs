mod common;

use std::sync::Arc;

use common::*;
use mvirt_inventory::{
    EntityKind, LifecycleState, MemoryStore, ObjectKind, PassScope, PowerState, RemoteIdentity,
    ResourceDocument, ResourceStore, SnapshotInventory, derive_key,
};

async fn synced_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    enumerator(SnapshotInventory::new(demo_snapshot()), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();
    store
}

/// A resource of another endpoint that is placed on `target`.
fn foreign_reference(target: &mvirt_inventory::LocalKey) -> ResourceDocument {
    let other = PassScope {
        endpoint_link: "/resources/endpoints/vc-2".to_string(),
        tenant_links: vec![],
        region_id: None,
    };
    let remote = id(ObjectKind::VirtualMachine, "vm-900");
    let mut doc = ResourceDocument::desired(
        derive_key(&remote, &other.endpoint_link),
        EntityKind::VirtualMachine,
        "W1",
        &other,
        remote,
    );
    doc.placement_link = Some(target.clone());
    doc
}

#[tokio::test]
async fn test_unreferenced_orphan_deleted_referenced_orphan_retired() {
    let store = synced_store().await;

    // H1 is host-21, C1 its standalone compute resource; W1 still sits on C1.
    let h1 = key(ObjectKind::HostSystem, "host-21");
    let c1 = key(ObjectKind::ComputeResource, "domain-s20");
    let w1 = foreign_reference(&c1);
    store.put(w1.clone()).await;

    let mut snapshot = demo_snapshot();
    remove_object(&mut snapshot, &id(ObjectKind::HostSystem, "host-21"));
    remove_object(&mut snapshot, &id(ObjectKind::ComputeResource, "domain-s20"));

    let result = enumerator(SnapshotInventory::new(snapshot), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(result.retired, 1);
    assert_eq!(result.errors, 0);
    let mut expected = vec![h1.clone(), c1.clone()];
    expected.sort();
    assert_eq!(result.orphan_links, expected);

    assert!(store.read(&h1).await.unwrap_err().is_not_found());
    let retired = store.read(&c1).await.unwrap();
    assert_eq!(retired.lifecycle, LifecycleState::Retired);
    assert_eq!(retired.power_state, PowerState::Off);
    assert_eq!(store.read(&w1.key).await.unwrap(), w1);
}

#[tokio::test]
async fn test_retired_resource_stays_retired() {
    let store = synced_store().await;
    let c1 = key(ObjectKind::ComputeResource, "domain-s20");
    store.put(foreign_reference(&c1)).await;

    let mut snapshot = demo_snapshot();
    remove_object(&mut snapshot, &id(ObjectKind::HostSystem, "host-21"));
    remove_object(&mut snapshot, &id(ObjectKind::ComputeResource, "domain-s20"));
    let enumerator = enumerator(SnapshotInventory::new(snapshot), &store);

    enumerator.run_pass(&scope(), &root()).await.unwrap();
    let retired = store.read(&c1).await.unwrap();

    let result = enumerator.run_pass(&scope(), &root()).await.unwrap();
    assert_eq!(result.retired, 0);
    assert_eq!(result.deleted, 0);
    assert_eq!(result.orphan_links, vec![c1.clone()]);
    assert_eq!(store.read(&c1).await.unwrap(), retired);
}

#[tokio::test]
async fn test_vanished_vm_takes_its_disks() {
    let store = synced_store().await;
    let vm = id(ObjectKind::VirtualMachine, "vm-30");
    let disks: Vec<_> = [2000, 2001]
        .iter()
        .map(|k| derive_key(&RemoteIdentity::disk(&vm, *k), ENDPOINT))
        .collect();

    let mut snapshot = demo_snapshot();
    remove_object(&mut snapshot, &vm);

    let result = enumerator(SnapshotInventory::new(snapshot), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();

    // The VM was placed on host-10, which is still there; nothing is retired.
    assert_eq!(result.deleted, 3);
    assert_eq!(result.retired, 0);
    assert!(store.read(&key(ObjectKind::VirtualMachine, "vm-30")).await.is_err());
    for disk in &disks {
        assert!(store.read(disk).await.unwrap_err().is_not_found());
    }
    assert!(store.read(&key(ObjectKind::Datastore, "datastore-15")).await.is_ok());
}

#[tokio::test]
async fn test_removed_disk_is_deleted_alone() {
    let store = synced_store().await;
    let vm = id(ObjectKind::VirtualMachine, "vm-30");

    let mut snapshot = demo_snapshot();
    for object in &mut snapshot.objects {
        if object.id == vm {
            let disks = object.properties.get_mut("config.hardware.disks").unwrap();
            disks.as_array_mut().unwrap().truncate(1);
        }
    }

    let result = enumerator(SnapshotInventory::new(snapshot), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(
        result.orphan_links,
        vec![derive_key(&RemoteIdentity::disk(&vm, 2001), ENDPOINT)]
    );
    let vm_doc = store.read(&key(ObjectKind::VirtualMachine, "vm-30")).await.unwrap();
    assert_eq!(vm_doc.capacity.storage_bytes, Some(42949672960));
}

#[tokio::test]
async fn test_other_endpoints_are_left_alone() {
    let store = synced_store().await;
    let foreign = foreign_reference(&key(ObjectKind::HostSystem, "host-10"));
    store.put(foreign.clone()).await;

    let result = enumerator(SnapshotInventory::new(demo_snapshot()), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();

    assert!(result.orphan_links.is_empty());
    assert_eq!(store.read(&foreign.key).await.unwrap(), foreign);
}

#[tokio::test]
async fn test_failed_vm_keeps_its_disks() {
    let store = synced_store().await;
    let vm = id(ObjectKind::VirtualMachine, "vm-30");
    let disks: Vec<_> = [2000, 2001]
        .iter()
        .map(|k| derive_key(&RemoteIdentity::disk(&vm, *k), ENDPOINT))
        .collect();

    let result = enumerator(FailingInventory::new(demo_snapshot(), [vm.clone()]), &store)
        .run_pass(&scope(), &root())
        .await
        .unwrap();

    assert_eq!(result.errors, 1);
    assert_eq!(result.deleted, 0);
    assert_eq!(result.retired, 0);
    assert!(result.orphan_links.is_empty());
    assert!(store.read(&key(ObjectKind::VirtualMachine, "vm-30")).await.is_ok());
    for disk in &disks {
        assert_eq!(store.read(disk).await.unwrap().lifecycle, LifecycleState::Active);
    }
}
