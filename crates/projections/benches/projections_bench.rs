use common::{StreamId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{CartEvent, DomainEvent, LineItem, Money, ProductId};
use event_store::{AppendOptions, InMemoryEventStore, NewEvent, store::EventStore};
use projections::{CartProjection, Projection, ProjectionProcessor};

fn to_new_event(user_id: &UserId, event: &CartEvent) -> NewEvent {
    NewEvent::from_payload(user_id.clone(), event.event_type(), event).unwrap()
}

/// Populates a store with N checked-out carts of 4 events each.
async fn populate_store(store: &InMemoryEventStore, n: usize) {
    for i in 0..n {
        let cart_id = StreamId::new();
        let user_id = UserId::new(format!("user-{}", i % 50));
        let item = LineItem::new("p1", "Widget", 2, Money::from_cents(1000));

        let events = vec![
            CartEvent::cart_created(cart_id, user_id.clone()),
            CartEvent::product_added(ProductId::new("p1"), 1, Money::from_cents(1000), "Widget"),
            CartEvent::product_added(ProductId::new("p1"), 1, Money::from_cents(1000), "Widget"),
            CartEvent::cart_checked_out([&item]),
        ];
        let events = events.iter().map(|e| to_new_event(&user_id, e)).collect();
        store
            .append(cart_id, events, AppendOptions::new())
            .await
            .unwrap();
    }
}

fn bench_catch_up(c: &mut Criterion, carts: usize) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, carts));

    c.bench_function(&format!("projections/catch_up_{}_events", carts * 4), |b| {
        b.iter(|| {
            rt.block_on(async {
                let projection = CartProjection::new();
                let mut processor = ProjectionProcessor::new(store.clone());
                processor.register(Box::new(projection) as Box<dyn Projection>);
                processor.run_catch_up().await.unwrap();
            });
        });
    });
}

fn bench_catch_up_100_carts(c: &mut Criterion) {
    bench_catch_up(c, 100);
}

fn bench_catch_up_1000_carts(c: &mut Criterion) {
    bench_catch_up(c, 1000);
}

fn bench_current_for_user(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    rt.block_on(populate_store(&store, 500));

    let projection = CartProjection::new();
    let mut processor = ProjectionProcessor::new(store);
    processor.register(Box::new(projection.clone()));
    rt.block_on(processor.run_catch_up()).unwrap();

    let user = UserId::new("user-7");
    c.bench_function("projections/current_for_user", |b| {
        b.iter(|| {
            rt.block_on(async {
                projection.current_for_user(&user).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_catch_up_100_carts,
    bench_catch_up_1000_carts,
    bench_current_for_user,
);
criterion_main!(benches);
