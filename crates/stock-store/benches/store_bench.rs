use criterion::{Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stock_store::{
    ActorId, InMemoryInventoryStore, InventoryStore, InventoryStoreExt, MovementDraft,
    MovementKind, MovementQuery, OwnerId, StockChange, StockInit, StockKey, StockRecord,
    UnitOfWork,
};

async fn seeded(store: &InMemoryInventoryStore) -> StockRecord {
    let record = store
        .upsert_stock(
            StockKey::new(OwnerId::new(), "SKU-BENCH", None),
            StockInit::default(),
        )
        .await
        .unwrap();
    store
        .apply_change(StockChange::new(
            record.id,
            dec!(1000000),
            Decimal::ZERO,
            record.version,
            MovementDraft::new(MovementKind::Receipt, ActorId::new()),
        ))
        .await
        .unwrap()
        .0
}

fn bench_single_change(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("stock_store/single_receipt", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryInventoryStore::new();
                seeded(&store).await;
            });
        });
    });
}

fn bench_unit_of_work_10(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("stock_store/unit_of_work_10_changes", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryInventoryStore::new();
                let record = seeded(&store).await;
                let mut work = UnitOfWork::new();
                let mut version = record.version;
                for _ in 0..10 {
                    work.push_change(StockChange::new(
                        record.id,
                        dec!(-1),
                        Decimal::ZERO,
                        version,
                        MovementDraft::new(MovementKind::Issue, ActorId::new()),
                    ));
                    version = version.next();
                }
                store.commit(work).await.unwrap();
            });
        });
    });
}

fn bench_history_page(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryInventoryStore::new();

    // Pre-populate with 500 movements
    let record = rt.block_on(async {
        let mut record = seeded(&store).await;
        for _ in 0..499 {
            record = store
                .apply_change(StockChange::new(
                    record.id,
                    dec!(-1),
                    Decimal::ZERO,
                    record.version,
                    MovementDraft::new(MovementKind::Issue, ActorId::new()),
                ))
                .await
                .unwrap()
                .0;
        }
        record
    });

    c.bench_function("stock_store/history_page_50", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .query_movements(MovementQuery::for_stock_record(record.id).limit(50))
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_single_change,
    bench_unit_of_work_10,
    bench_history_page
);
criterion_main!(benches);
