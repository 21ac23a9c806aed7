use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventEnvelope, EventStoreError, NewEvent, Result, Snapshot, StreamId, UserId, Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

#[derive(Default)]
struct Log {
    /// Every committed event in global append order.
    events: Vec<EventEnvelope>,
    /// Current version per stream, kept alongside `events` under one lock.
    versions: HashMap<StreamId, Version>,
}

/// In-memory event store implementation.
///
/// Provides the same guarantees as the PostgreSQL store: the version check
/// and sequence allocation for an append run under a single write lock.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    log: Arc<RwLock<Log>>,
    snapshots: Arc<RwLock<HashMap<StreamId, Snapshot>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.log.read().await.events.len()
    }

    /// Returns the number of stored snapshots.
    pub async fn snapshot_count(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Drops every snapshot, leaving the event log untouched.
    pub async fn clear_snapshots(&self) {
        self.snapshots.write().await.clear();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        validate_events_for_append(&events)?;

        let mut log = self.log.write().await;

        let current_version = log
            .versions
            .get(&stream_id)
            .copied()
            .unwrap_or_else(Version::initial);

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current_version,
            });
        }

        let mut sequence = current_version;
        let committed: Vec<EventEnvelope> = events
            .into_iter()
            .map(|event| {
                sequence = sequence.next();
                event.commit(stream_id, sequence)
            })
            .collect();

        log.versions.insert(stream_id, sequence);
        log.events.extend(committed.iter().cloned());

        metrics::counter!("events_appended_total").increment(committed.len() as u64);

        Ok(committed)
    }

    async fn read_stream(&self, stream_id: StreamId) -> Result<Vec<EventEnvelope>> {
        self.read_stream_from(stream_id, Version::first()).await
    }

    async fn read_stream_from(
        &self,
        stream_id: StreamId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;
        let mut events: Vec<_> = log
            .events
            .iter()
            .filter(|e| e.stream_id == stream_id && e.sequence >= from)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn read_by_user(&self, user_id: &UserId) -> Result<Vec<EventEnvelope>> {
        let log = self.log.read().await;

        // Stream order follows the global position of each stream's first event
        let mut stream_order: Vec<StreamId> = Vec::new();
        let mut by_stream: HashMap<StreamId, Vec<EventEnvelope>> = HashMap::new();
        for event in log.events.iter().filter(|e| &e.user_id == user_id) {
            by_stream
                .entry(event.stream_id)
                .or_insert_with(|| {
                    stream_order.push(event.stream_id);
                    Vec::new()
                })
                .push(event.clone());
        }

        let mut grouped = Vec::new();
        for stream_id in stream_order {
            if let Some(mut events) = by_stream.remove(&stream_id) {
                events.sort_by_key(|e| e.sequence);
                grouped.extend(events);
            }
        }
        Ok(grouped)
    }

    async fn stream_version(&self, stream_id: StreamId) -> Result<Option<Version>> {
        Ok(self.log.read().await.versions.get(&stream_id).copied())
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events = self.log.read().await.events.clone();
        let stream = stream::iter(events.into_iter().map(Ok));
        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        match snapshots.get(&snapshot.stream_id) {
            Some(existing) if existing.version >= snapshot.version => {}
            _ => {
                snapshots.insert(snapshot.stream_id, snapshot);
            }
        }
        Ok(())
    }

    async fn get_snapshot(&self, stream_id: StreamId) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(&stream_id).cloned())
    }
}
