use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{StreamId, UserId};

/// Unique identifier for an event, generated by the store at append time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-stream sequence number, also used as the stream version for
/// optimistic concurrency control.
///
/// The first event of a stream has sequence 1; an empty stream is at
/// version 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Version of a stream with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Sequence number of the first event in a stream.
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// An event that has not been committed yet.
///
/// Carries no id, sequence number or timestamp: the store assigns all three
/// when the event is appended, so a retried command never reuses them.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub user_id: UserId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl NewEvent {
    /// Creates a pending event from a raw JSON payload.
    pub fn new(
        user_id: UserId,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            user_id,
            event_type: event_type.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    /// Creates a pending event by serializing a domain payload.
    pub fn from_payload<T: Serialize>(
        user_id: UserId,
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(user_id, event_type, serde_json::to_value(payload)?))
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Stamps the event with the identity and position the store assigned.
    pub(crate) fn commit(self, stream_id: StreamId, sequence: Version) -> EventEnvelope {
        EventEnvelope {
            event_id: EventId::new(),
            stream_id,
            user_id: self.user_id,
            sequence,
            event_type: self.event_type,
            timestamp: Utc::now(),
            payload: self.payload,
            metadata: self.metadata,
        }
    }
}

/// A committed event as stored in, and read back from, the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,

    /// The stream (cart) this event belongs to.
    pub stream_id: StreamId,

    /// The user owning the stream.
    pub user_id: UserId,

    /// Position of the event within its stream, starting at 1.
    pub sequence: Version,

    /// Variant name of the domain event (e.g. "ProductAdded").
    pub event_type: String,

    /// When the store committed the event.
    pub timestamp: DateTime<Utc>,

    pub payload: serde_json::Value,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl EventEnvelope {
    /// Deserializes the payload into a concrete domain event.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn commit_assigns_fresh_identity_each_time() {
        let stream_id = StreamId::new();
        let pending = NewEvent::new(
            UserId::new("u1"),
            "CartCreated",
            serde_json::json!({"cart": true}),
        )
        .with_metadata("correlation_id", serde_json::json!("123"));

        let first = pending.clone().commit(stream_id, Version::first());
        let retried = pending.commit(stream_id, Version::first());

        assert_ne!(first.event_id, retried.event_id);
        assert_eq!(first.sequence, Version::first());
        assert_eq!(first.user_id, UserId::new("u1"));
        assert_eq!(
            first.metadata.get("correlation_id"),
            Some(&serde_json::json!("123"))
        );
    }

    #[test]
    fn decode_reads_payload() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Payload {
            quantity: u32,
        }

        let envelope = NewEvent::from_payload(UserId::new("u1"), "Test", &Payload { quantity: 3 })
            .unwrap()
            .commit(StreamId::new(), Version::first());

        let decoded: Payload = envelope.decode().unwrap();
        assert_eq!(decoded, Payload { quantity: 3 });
    }
}
