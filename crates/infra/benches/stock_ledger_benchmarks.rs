use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use std::sync::Arc;

use farmstock_core::{AggregateId, TenantId};
use farmstock_events::{EventEnvelope, InMemoryEventBus};
use farmstock_infra::command_dispatcher::CommandDispatcher;
use farmstock_infra::event_store::InMemoryEventStore;
use farmstock_inventory::{
    CreateItem, InventoryCommand, InventoryItem, InventoryItemId, ItemCategory, MovementType,
    RecordMovement,
};

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

fn setup() -> (CommandDispatcher<InMemoryEventStore, Bus>, TenantId, AggregateId) {
    let store = InMemoryEventStore::new();
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus);
    (dispatcher, TenantId::new(), AggregateId::new())
}

fn create_cmd(tenant_id: TenantId, item_id: InventoryItemId, qty: i64) -> InventoryCommand {
    InventoryCommand::CreateItem(CreateItem {
        tenant_id,
        item_id,
        name: "Layer feed".to_string(),
        category: ItemCategory::Feed,
        unit: "kg".to_string(),
        initial_quantity: qty,
        min_quantity: Some(50),
        unit_cost: Some(120),
        expires_at: None,
        batch: None,
        occurred_at: Utc::now(),
    })
}

fn movement_cmd(
    tenant_id: TenantId,
    item_id: InventoryItemId,
    ty: MovementType,
    qty: i64,
) -> InventoryCommand {
    InventoryCommand::RecordMovement(RecordMovement {
        tenant_id,
        item_id,
        movement_type: ty,
        quantity: qty,
        notes: None,
        reference: None,
        occurred_at: Utc::now(),
    })
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");
    group.sample_size(1000);

    group.bench_function("create_item_fresh", |b| {
        let (dispatcher, tenant_id, _) = setup();
        b.iter(|| {
            let agg = AggregateId::new();
            let item_id = InventoryItemId::new(agg);
            dispatcher
                .dispatch(
                    tenant_id,
                    agg,
                    "inventory.item",
                    black_box(create_cmd(tenant_id, item_id, 100)),
                    |_, id| InventoryItem::empty(InventoryItemId::new(id)),
                )
                .unwrap();
        });
    });

    group.bench_function("record_movement_with_history", |b| {
        let (dispatcher, tenant_id, agg) = setup();
        let item_id = InventoryItemId::new(agg);
        dispatcher
            .dispatch(
                tenant_id,
                agg,
                "inventory.item",
                create_cmd(tenant_id, item_id, i64::MAX / 4),
                |_, id| InventoryItem::empty(InventoryItemId::new(id)),
            )
            .unwrap();

        b.iter(|| {
            dispatcher
                .dispatch(
                    tenant_id,
                    agg,
                    "inventory.item",
                    black_box(movement_cmd(tenant_id, item_id, MovementType::Usage, 1)),
                    |_, id| InventoryItem::empty(InventoryItemId::new(id)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_rehydration_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("rehydration_depth");

    for depth in [10u64, 100, 1000] {
        let (dispatcher, tenant_id, agg) = setup();
        let item_id = InventoryItemId::new(agg);
        dispatcher
            .dispatch(
                tenant_id,
                agg,
                "inventory.item",
                create_cmd(tenant_id, item_id, 0),
                |_, id| InventoryItem::empty(InventoryItemId::new(id)),
            )
            .unwrap();
        for _ in 0..depth {
            dispatcher
                .dispatch(
                    tenant_id,
                    agg,
                    "inventory.item",
                    movement_cmd(tenant_id, item_id, MovementType::Purchase, 1),
                    |_, id| InventoryItem::empty(InventoryItemId::new(id)),
                )
                .unwrap();
        }

        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(BenchmarkId::new("load_item", depth), &depth, |b, _| {
            b.iter(|| {
                let item: Option<InventoryItem> = dispatcher
                    .load(tenant_id, agg, |_, id| {
                        InventoryItem::empty(InventoryItemId::new(id))
                    })
                    .unwrap();
                black_box(item)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_command_latency, bench_rehydration_depth);
criterion_main!(benches);
