//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and truncate the tables
//! before each test, so they run serially.
//!
//! ```bash
//! cargo test -p event-store --test postgres_integration
//! ```

use std::sync::Arc;

use event_store::{
    AppendOptions, EventStore, EventStoreError, EventStoreExt, NewEvent, PostgresEventStore,
    Snapshot, StreamId, UserId, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_events_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresEventStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE events, snapshots")
        .execute(&pool)
        .await
        .unwrap();

    PostgresEventStore::new(pool)
}

fn pending(user: &str, event_type: &str) -> NewEvent {
    NewEvent::new(
        UserId::new(user),
        event_type,
        serde_json::json!({"test": true}),
    )
}

#[tokio::test]
#[serial]
async fn append_and_read_stream() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    let committed = store
        .append(
            stream_id,
            vec![pending("u1", "CartCreated")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();
    assert_eq!(committed[0].sequence, Version::first());

    let events = store.read_stream(stream_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "CartCreated");
    assert_eq!(events[0].user_id, UserId::new("u1"));
    assert_eq!(events[0].event_id, committed[0].event_id);
}

#[tokio::test]
#[serial]
async fn append_batch_assigns_consecutive_sequences() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .append(
            stream_id,
            vec![
                pending("u1", "Event1"),
                pending("u1", "Event2"),
                pending("u1", "Event3"),
            ],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let stored = store.read_stream(stream_id).await.unwrap();
    let sequences: Vec<i64> = stored.iter().map(|e| e.sequence.as_i64()).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(stored[2].event_type, "Event3");
}

#[tokio::test]
#[serial]
async fn stale_expected_version_conflicts() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .append(
            stream_id,
            vec![pending("u1", "Event1")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let result = store
        .append(
            stream_id,
            vec![pending("u1", "Event2")],
            AppendOptions::expect_version(Version::initial()),
        )
        .await;

    assert!(matches!(
        result,
        Err(EventStoreError::ConcurrencyConflict { actual, .. }) if actual == Version::first()
    ));
    assert_eq!(store.read_stream(stream_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn concurrent_appends_with_same_expectation_admit_one() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();
    store
        .append(
            stream_id,
            vec![pending("u1", "CartCreated")],
            AppendOptions::expect_new(),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(
                    stream_id,
                    vec![pending("u1", &format!("Event{i}"))],
                    AppendOptions::expect_version(Version::first()),
                )
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) => assert!(e.is_conflict()),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(
        store.stream_version(stream_id).await.unwrap(),
        Some(Version::new(2))
    );
}

#[tokio::test]
#[serial]
async fn unchecked_concurrent_appends_get_distinct_sequences() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .append(
                    stream_id,
                    vec![pending("u1", &format!("Event{i}"))],
                    AppendOptions::new(),
                )
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let sequences: Vec<i64> = store
        .read_stream(stream_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.sequence.as_i64())
        .collect();
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
#[serial]
async fn read_stream_from_returns_tail() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .append(
            stream_id,
            vec![
                pending("u1", "Event1"),
                pending("u1", "Event2"),
                pending("u1", "Event3"),
            ],
            AppendOptions::new(),
        )
        .await
        .unwrap();

    let tail = store
        .read_stream_from(stream_id, Version::new(2))
        .await
        .unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].sequence, Version::new(2));
}

#[tokio::test]
#[serial]
async fn read_by_user_groups_streams_in_creation_order() {
    let store = get_test_store().await;
    let first = StreamId::new();
    let second = StreamId::new();

    store
        .append(first, vec![pending("u1", "A1")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(second, vec![pending("u1", "B1")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(StreamId::new(), vec![pending("u2", "C1")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(first, vec![pending("u1", "A2")], AppendOptions::new())
        .await
        .unwrap();

    let events = store.read_by_user(&UserId::new("u1")).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["A1", "A2", "B1"]);

    let none = store.read_by_user(&UserId::new("nobody")).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
#[serial]
async fn snapshot_save_and_retrieve() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .save_snapshot(Snapshot::new(
            stream_id,
            Version::new(10),
            serde_json::json!({"state": "saved"}),
        ))
        .await
        .unwrap();

    let retrieved = store.get_snapshot(stream_id).await.unwrap().unwrap();
    assert_eq!(retrieved.stream_id, stream_id);
    assert_eq!(retrieved.version, Version::new(10));
    assert_eq!(retrieved.state, serde_json::json!({"state": "saved"}));
}

#[tokio::test]
#[serial]
async fn older_snapshot_does_not_replace_newer() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .save_snapshot(Snapshot::new(
            stream_id,
            Version::new(20),
            serde_json::json!({"state": "newer"}),
        ))
        .await
        .unwrap();
    store
        .save_snapshot(Snapshot::new(
            stream_id,
            Version::new(10),
            serde_json::json!({"state": "older"}),
        ))
        .await
        .unwrap();

    let retrieved = store.get_snapshot(stream_id).await.unwrap().unwrap();
    assert_eq!(retrieved.version, Version::new(20));
}

#[tokio::test]
#[serial]
async fn snapshot_not_found() {
    let store = get_test_store().await;
    assert!(store.get_snapshot(StreamId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn stream_all_events_in_append_order() {
    use futures_util::StreamExt;

    let store = get_test_store().await;
    let id1 = StreamId::new();
    let id2 = StreamId::new();

    store
        .append(id1, vec![pending("u1", "Event1")], AppendOptions::new())
        .await
        .unwrap();
    store
        .append(id2, vec![pending("u2", "Event2")], AppendOptions::new())
        .await
        .unwrap();

    let stream = store.stream_all_events().await.unwrap();
    let events: Vec<_> = stream.collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_ref().unwrap().event_type, "Event1");
    assert_eq!(events[1].as_ref().unwrap().event_type, "Event2");
}

#[tokio::test]
#[serial]
async fn load_stream_with_snapshot() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    store
        .append(
            stream_id,
            vec![
                pending("u1", "Event1"),
                pending("u1", "Event2"),
                pending("u1", "Event3"),
            ],
            AppendOptions::new(),
        )
        .await
        .unwrap();
    store
        .save_snapshot(Snapshot::new(
            stream_id,
            Version::new(2),
            serde_json::json!({"state": "at_v2"}),
        ))
        .await
        .unwrap();

    let (snapshot, events) = store.load_stream(stream_id).await.unwrap();
    assert_eq!(snapshot.unwrap().version, Version::new(2));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sequence, Version::new(3));
    assert!(store.stream_exists(stream_id).await.unwrap());
}

#[tokio::test]
#[serial]
async fn event_metadata_preserved() {
    let store = get_test_store().await;
    let stream_id = StreamId::new();

    let event = pending("u1", "TestEvent")
        .with_metadata("correlation_id", serde_json::json!("corr-123"))
        .with_metadata("causation_id", serde_json::json!("cause-456"));

    store
        .append_event(stream_id, event, AppendOptions::new())
        .await
        .unwrap();

    let events = store.read_stream(stream_id).await.unwrap();
    let retrieved = &events[0];
    assert_eq!(
        retrieved.metadata.get("correlation_id"),
        Some(&serde_json::json!("corr-123"))
    );
    assert_eq!(
        retrieved.metadata.get("causation_id"),
        Some(&serde_json::json!("cause-456"))
    );
}
