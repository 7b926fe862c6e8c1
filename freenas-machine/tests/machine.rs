//! Session behaviour across refreshes, driven through the in-memory appliance.

use std::sync::Arc;
use std::time::Duration;

use freenas_machine::{
    EntityId, EntityKind, FieldValue, Machine, MachineOptions, MemoryService, Pool, PoolField,
    PoolScanState, PoolStatus, QueryService, VirtualMachine,
};
use serde_json::{Value, json};

fn test_pool() -> Value {
    json!({
        "encrypt": 0,
        "encryptkey": "",
        "guid": "1234ABCD",
        "id": 100,
        "is_decrypted": true,
        "name": "testpool",
        "scan": {
            "bytes_issued": 90546145402880i64,
            "bytes_processed": 90902589915136i64,
            "bytes_to_process": 90546369048576i64,
            "end_time": {"$date": 1597556583000i64},
            "errors": 0,
            "function": "SCRUB",
            "pause": null,
            "percentage": 99.60788488388062,
            "start_time": {"$date": 1597420834000i64},
            "state": "FINISHED"
        },
        "status": "ONLINE",
        "topology": {}
    })
}

/// Appliance with empty disk and VM collections.
fn server() -> Arc<MemoryService> {
    Arc::new(MemoryService::empty())
}

async fn connect(service: &Arc<MemoryService>) -> Machine {
    Machine::create(
        Arc::clone(service) as Arc<dyn QueryService>,
        MachineOptions {
            refresh_on_create: false,
        },
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_pool_data_interpretation() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([test_pool()]))
        .unwrap();
    let machine = connect(&service).await;

    machine.refresh().await.unwrap();

    let pools = machine.pools().unwrap();
    assert_eq!(pools.len(), 1);
    let pool = &pools[0];
    assert_eq!(pool.id(), &EntityId::Int(100));
    assert_eq!(pool.get(PoolField::Encrypt), FieldValue::Int(0));
    assert_eq!(pool.get(PoolField::Guid), FieldValue::Text("1234ABCD".into()));
    assert_eq!(pool.get(PoolField::IsDecrypted), FieldValue::Bool(true));
    assert_eq!(pool.name(), "testpool");
    assert_eq!(pool.status(), Some(PoolStatus::Online));
    assert_eq!(
        pool.fields().scan.as_ref().and_then(|s| s.state),
        Some(PoolScanState::Finished)
    );

    machine.close().await.unwrap();
}

#[tokio::test]
async fn test_availability() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([test_pool()]))
        .unwrap();
    let machine = connect(&service).await;

    machine.refresh().await.unwrap();
    let pool = Arc::clone(&machine.pools().unwrap()[0]);
    assert!(pool.available());

    service.set_json(EntityKind::Pool, json!([])).unwrap();
    machine.refresh().await.unwrap();

    assert!(!pool.available());
    assert_eq!(machine.pools().unwrap().len(), 1);
    assert!(machine.disks().unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_caching() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([test_pool()]))
        .unwrap();
    let machine = connect(&service).await;
    machine.refresh().await.unwrap();
    let pool = Arc::clone(&machine.pools().unwrap()[0]);

    service.set_json(EntityKind::Pool, json!([])).unwrap();
    machine.refresh().await.unwrap();

    assert_eq!(pool.get(PoolField::Encrypt), FieldValue::Int(0));
    assert_eq!(pool.get(PoolField::Guid), FieldValue::Text("1234ABCD".into()));
    assert_eq!(pool.id(), &EntityId::Int(100));
    assert_eq!(pool.get(PoolField::IsDecrypted), FieldValue::Bool(true));
    assert_eq!(pool.name(), "testpool");
    assert_eq!(pool.status(), Some(PoolStatus::Online));
}

#[tokio::test]
async fn test_same_instance_after_refresh() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([{"id": 500, "name": "test_pool"}]))
        .unwrap();
    let machine = connect(&service).await;

    machine.refresh().await.unwrap();
    let original = Arc::clone(&machine.pools().unwrap()[0]);
    machine.refresh().await.unwrap();
    let refreshed = Arc::clone(&machine.pools().unwrap()[0]);

    assert!(Arc::ptr_eq(&original, &refreshed));
}

#[tokio::test]
async fn test_eq_across_lookups_and_refreshes() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([{"id": 200, "name": "test_pool"}]))
        .unwrap();
    let machine = connect(&service).await;
    machine.refresh().await.unwrap();

    let a = machine.entity::<Pool>(200).unwrap();
    let b = machine.pools().unwrap()[0].as_ref().clone();
    assert_eq!(*a, b);

    service
        .set_json(EntityKind::Pool, json!([{"id": 200, "name": "renamed"}]))
        .unwrap();
    machine.refresh().await.unwrap();

    assert_eq!(*a, b);
    assert_eq!(b.name(), "renamed");
}

#[tokio::test]
async fn test_stale_status_after_disappearance() {
    let service = server();
    service
        .set_json(
            EntityKind::Pool,
            json!([{"id": 100, "name": "tank", "status": "ONLINE"}]),
        )
        .unwrap();
    let machine = connect(&service).await;

    machine.refresh().await.unwrap();
    let pools = machine.pools().unwrap();
    assert_eq!(pools.len(), 1);
    assert!(pools[0].available());
    assert_eq!(pools[0].get(PoolField::Status), FieldValue::Enum("ONLINE"));

    service.set_json(EntityKind::Pool, json!([])).unwrap();
    machine.refresh().await.unwrap();

    let after = machine.pools().unwrap();
    assert!(Arc::ptr_eq(&pools[0], &after[0]));
    assert!(!after[0].available());
    assert_eq!(after[0].get(PoolField::Status), FieldValue::Enum("ONLINE"));
    assert_eq!(after[0].get(PoolField::Name), FieldValue::Text("tank".into()));
}

#[tokio::test]
async fn test_fields_follow_latest_pass() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([{"id": 200, "name": "a"}]))
        .unwrap();
    let machine = connect(&service).await;
    machine.refresh().await.unwrap();
    let before = Arc::clone(&machine.pools().unwrap()[0]);

    service
        .set_json(EntityKind::Pool, json!([{"id": 200, "name": "b"}]))
        .unwrap();
    machine.refresh().await.unwrap();

    let after = Arc::clone(&machine.pools().unwrap()[0]);
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.get(PoolField::Name), FieldValue::Text("b".into()));
}

#[tokio::test]
async fn test_concurrent_refreshes_are_serialized() {
    let service = server();
    service
        .set_json(EntityKind::Vm, json!([{"id": 1, "name": "vm1"}]))
        .unwrap();
    service.set_delay(Duration::from_millis(20));
    let machine = Arc::new(connect(&service).await);

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let machine = Arc::clone(&machine);
            tokio::spawn(async move { machine.refresh().await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(service.max_in_flight(), 1);
    assert_eq!(machine.passes(), 4);
    assert_eq!(service.query_count(EntityKind::Vm), 4);
    assert_eq!(machine.vms().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reads_during_refresh() {
    let service = server();
    service
        .set_json(EntityKind::Vm, json!([{"id": 1, "name": "old", "vcpus": 1}]))
        .unwrap();
    let machine = Arc::new(connect(&service).await);
    machine.refresh().await.unwrap();
    let vm = machine.entity::<VirtualMachine>(1).unwrap();

    service
        .set_json(EntityKind::Vm, json!([{"id": 1, "name": "new", "vcpus": 2}]))
        .unwrap();
    service.set_delay(Duration::from_millis(50));

    let refresher = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.refresh().await })
    };

    // Each read sees one whole pass, never a mix of both.
    for _ in 0..20 {
        let fields = vm.fields();
        match fields.name.as_str() {
            "old" => assert_eq!(fields.vcpus, Some(1)),
            "new" => assert_eq!(fields.vcpus, Some(2)),
            other => panic!("unexpected name {}", other),
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    refresher.await.unwrap().unwrap();
    assert_eq!(vm.name(), "new");
}

#[tokio::test]
async fn test_handles_from_separate_sessions_differ() {
    let service = server();
    service
        .set_json(EntityKind::Pool, json!([{"id": 1, "name": "tank"}]))
        .unwrap();
    let first = connect(&service).await;
    let second = connect(&service).await;
    first.refresh().await.unwrap();
    second.refresh().await.unwrap();

    let a = first.entity::<Pool>(1).unwrap();
    let b = second.entity::<Pool>(1).unwrap();

    assert_ne!(first.id(), second.id());
    assert_ne!(*a, *b);
}
