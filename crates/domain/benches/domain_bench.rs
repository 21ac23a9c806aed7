use common::{StreamId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Aggregate, Cart, CartEvent, CommandHandler, DomainEvent, Money, ProductId, RetryPolicy};
use event_store::{AppendOptions, InMemoryEventStore, NewEvent, store::EventStore};

fn to_new_event(event: &CartEvent) -> NewEvent {
    NewEvent::from_payload(UserId::new("bench-user"), event.event_type(), event).unwrap()
}

fn seed_history(rt: &tokio::runtime::Runtime, store: &InMemoryEventStore, adds: i64) -> StreamId {
    let cart_id = StreamId::new();
    rt.block_on(async {
        let mut events = vec![to_new_event(&CartEvent::cart_created(
            cart_id,
            UserId::new("bench-user"),
        ))];
        for v in 1..=adds {
            let added = CartEvent::product_added(
                ProductId::new(format!("p{:03}", v % 20)),
                1,
                Money::from_cents(100 * v),
                format!("Product {v}"),
            );
            events.push(to_new_event(&added));
        }
        store
            .append(cart_id, events, AppendOptions::new())
            .await
            .unwrap();
    });
    cart_id
}

fn bench_create_cart(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("domain/create_cart", |b| {
        b.iter(|| {
            rt.block_on(async {
                let handler: CommandHandler<_, Cart> =
                    CommandHandler::new(InMemoryEventStore::new());
                let cart_id = StreamId::new();
                handler
                    .execute(cart_id, |cart| cart.create(cart_id, UserId::new("bench-user")))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_add_product(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let cart_id = seed_history(&rt, &store, 0);
    let handler: CommandHandler<_, Cart> = CommandHandler::new(store);
    let policy = RetryPolicy::default();

    c.bench_function("domain/add_product_with_retry", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler
                    .execute_with_retry(cart_id, &policy, |cart| {
                        cart.add_product(ProductId::new("p1"), 1, Money::from_cents(1000), "Widget")
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let cart_id = seed_history(&rt, &store, 99);

    c.bench_function("domain/replay_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.read_stream(cart_id).await.unwrap();
                let cart = Cart::from_events(
                    events
                        .iter()
                        .map(|e| (e.sequence, e.decode::<CartEvent>().unwrap())),
                );
                assert_eq!(cart.version().as_i64(), 100);
            });
        });
    });
}

fn bench_load_with_snapshot(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let handler: CommandHandler<_, Cart> = CommandHandler::new(store.clone());
    let cart_id = seed_history(&rt, &store, 98);

    // One more command crosses version 100 and writes a snapshot
    rt.block_on(async {
        handler
            .execute(cart_id, |cart| {
                cart.add_product(ProductId::new("p1"), 1, Money::from_cents(1), "Widget")
            })
            .await
            .unwrap();
    });

    c.bench_function("domain/load_from_snapshot", |b| {
        b.iter(|| {
            rt.block_on(async {
                handler.load(cart_id).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create_cart,
    bench_add_product,
    bench_replay,
    bench_load_with_snapshot,
);
criterion_main!(benches);
