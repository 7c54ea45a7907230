use criterion::{Criterion, criterion_group, criterion_main};
use common::{ActorId, OwnerId};
use domain::{
    Aggregate, Direction, MovementLedger, NewLine, OpenOperation, OperationWorkflow,
    TransportInfo,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stock_store::{
    InMemoryInventoryStore, InventoryStore, InventoryStoreExt, MovementDraft, MovementKind,
    StockChange, StockInit, StockKey,
};

fn open_input(direction: Direction, owner_id: OwnerId) -> OpenOperation {
    OpenOperation {
        direction,
        owner_id,
        external_reference: None,
        transport: TransportInfo::default(),
    }
}

fn line(quantity: Decimal) -> NewLine {
    NewLine {
        product_code: "SKU-BENCH".to_string(),
        quantity,
        lot: None,
        expiry_date: None,
    }
}

fn bench_open_operation(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let workflow = OperationWorkflow::new(InMemoryInventoryStore::new());
    let owner = OwnerId::new();

    c.bench_function("domain/open_operation", |b| {
        b.iter(|| {
            rt.block_on(async {
                workflow
                    .open(open_input(Direction::Inbound, owner), ActorId::new())
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_outbound_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryInventoryStore::new();
    let workflow = OperationWorkflow::new(store.clone());
    let owner = OwnerId::new();
    let actor = ActorId::new();

    rt.block_on(async {
        let record = store
            .upsert_stock(StockKey::new(owner, "SKU-BENCH", None), StockInit::default())
            .await
            .unwrap();
        store
            .apply_change(StockChange::new(
                record.id,
                dec!(100000000),
                Decimal::ZERO,
                record.version,
                MovementDraft::new(MovementKind::Receipt, actor),
            ))
            .await
            .unwrap();
    });

    c.bench_function("domain/outbound_open_add_close", |b| {
        b.iter(|| {
            rt.block_on(async {
                let operation = workflow
                    .open(open_input(Direction::Outbound, owner), actor)
                    .await
                    .unwrap();
                let id = operation.id().unwrap();
                workflow.add_line(id, line(dec!(3)), actor).await.unwrap();
                workflow.close(id, actor).await.unwrap();
            });
        });
    });
}

fn bench_monthly_aggregate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryInventoryStore::new();

    // Pre-populate with 1000 receipts
    let record = rt.block_on(async {
        let mut record = store
            .upsert_stock(
                StockKey::new(OwnerId::new(), "SKU-BENCH", None),
                StockInit::default(),
            )
            .await
            .unwrap();
        for _ in 0..1000 {
            record = store
                .apply_change(StockChange::new(
                    record.id,
                    dec!(1),
                    Decimal::ZERO,
                    record.version,
                    MovementDraft::new(MovementKind::Receipt, ActorId::new()),
                ))
                .await
                .unwrap()
                .0;
        }
        record
    });
    let ledger = MovementLedger::new(store);

    c.bench_function("domain/monthly_aggregate_12", |b| {
        b.iter(|| {
            rt.block_on(async {
                ledger.monthly_aggregate(record.id, 12).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_open_operation,
    bench_outbound_cycle,
    bench_monthly_aggregate
);
criterion_main!(benches);
