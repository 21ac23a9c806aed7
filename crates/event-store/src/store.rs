use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EventEnvelope, EventStoreError, NewEvent, Result, Snapshot, StreamId, UserId, Version};

/// Options for appending events to the store.
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Expected version of the stream for optimistic concurrency control.
    /// If None, no version check is performed (use with caution).
    pub expected_version: Option<Version>,
}

impl AppendOptions {
    /// Creates options with no version check.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stream to be at a specific version.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the stream to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// A stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EventEnvelope>> + Send>>;

/// Append-only, per-stream ordered event log.
///
/// The store is the only place sequence numbers are allocated. Allocation
/// and the expected-version check happen in one atomic step per stream, so
/// two concurrent appenders can never both be handed the same sequence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to a stream.
    ///
    /// Events receive consecutive sequence numbers starting after the
    /// stream's current maximum, in the order given. If
    /// `options.expected_version` is set and does not match the current
    /// version, nothing is written and `ConcurrencyConflict` is returned.
    ///
    /// Returns the committed envelopes.
    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves all events of a stream in sequence order.
    ///
    /// A stream that does not exist yields an empty list.
    async fn read_stream(&self, stream_id: StreamId) -> Result<Vec<EventEnvelope>>;

    /// Retrieves the events of a stream with sequence >= `from`.
    ///
    /// Used to replay the tail after a snapshot.
    async fn read_stream_from(
        &self,
        stream_id: StreamId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>>;

    /// Retrieves every event of every stream owned by a user.
    ///
    /// Events are grouped by stream and ordered by sequence within each
    /// stream. Streams appear in the order their first event was stored.
    async fn read_by_user(&self, user_id: &UserId) -> Result<Vec<EventEnvelope>>;

    /// Gets the current version of a stream, or None if it has no events.
    async fn stream_version(&self, stream_id: StreamId) -> Result<Option<Version>>;

    /// Streams every event in the store in global append order.
    async fn stream_all_events(&self) -> Result<EventStream>;

    /// Saves a snapshot, replacing an older snapshot of the same stream.
    /// A snapshot at or below the stored version is ignored.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()>;

    /// Retrieves the latest snapshot of a stream.
    async fn get_snapshot(&self, stream_id: StreamId) -> Result<Option<Snapshot>>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Appends a single event to a stream.
    async fn append_event(
        &self,
        stream_id: StreamId,
        event: NewEvent,
        options: AppendOptions,
    ) -> Result<EventEnvelope> {
        let mut committed = self.append(stream_id, vec![event], options).await?;
        committed
            .pop()
            .ok_or_else(|| EventStoreError::InvalidAppend("append returned no events".into()))
    }

    /// Checks if a stream exists (has any events).
    async fn stream_exists(&self, stream_id: StreamId) -> Result<bool> {
        Ok(self.stream_version(stream_id).await?.is_some())
    }

    /// Loads a stream's events, starting from its snapshot when one exists.
    ///
    /// With a snapshot, returns it together with the events after it.
    /// Otherwise returns None and the full stream.
    async fn load_stream(
        &self,
        stream_id: StreamId,
    ) -> Result<(Option<Snapshot>, Vec<EventEnvelope>)> {
        if let Some(snapshot) = self.get_snapshot(stream_id).await? {
            let events = self
                .read_stream_from(stream_id, snapshot.version.next())
                .await?;
            Ok((Some(snapshot), events))
        } else {
            let events = self.read_stream(stream_id).await?;
            Ok((None, events))
        }
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Validates a batch before appending.
pub fn validate_events_for_append(events: &[NewEvent]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty event list".to_string(),
        ));
    };

    if events.iter().any(|e| e.event_type.is_empty()) {
        return Err(EventStoreError::InvalidAppend(
            "event type must not be empty".to_string(),
        ));
    }

    // A stream belongs to exactly one user
    if events.iter().any(|e| e.user_id != first.user_id) {
        return Err(EventStoreError::InvalidAppend(
            "all events in a batch must belong to the same user".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(user: &str) -> NewEvent {
        NewEvent::new(UserId::new(user), "TestEvent", serde_json::json!({}))
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = validate_events_for_append(&[]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn mixed_users_are_rejected() {
        let err = validate_events_for_append(&[pending("u1"), pending("u2")]).unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidAppend(_)));
    }

    #[test]
    fn single_user_batch_is_accepted() {
        assert!(validate_events_for_append(&[pending("u1"), pending("u1")]).is_ok());
    }

    #[test]
    fn append_options_constructors() {
        assert_eq!(AppendOptions::new().expected_version, None);
        assert_eq!(
            AppendOptions::expect_new().expected_version,
            Some(Version::initial())
        );
        assert_eq!(
            AppendOptions::expect_version(Version::new(4)).expected_version,
            Some(Version::new(4))
        );
    }
}
