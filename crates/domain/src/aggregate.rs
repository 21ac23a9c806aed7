//! Core aggregate and domain event traits.

use common::{StreamId, UserId};
use event_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name stored alongside the payload.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates in an event-sourced system.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events
/// - Decide on new events without mutating themselves
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<StreamId>;

    /// Returns the user owning this aggregate's stream.
    fn owner(&self) -> Option<&UserId>;

    /// Returns the sequence number of the last applied event, 0 when empty.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence, leaving the version untouched.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Applies sequenced events in order, tracking the version.
    fn replay(&mut self, events: impl IntoIterator<Item = (Version, Self::Event)>) {
        for (sequence, event) in events {
            self.apply(event);
            self.set_version(sequence);
        }
    }

    /// Rebuilds an aggregate from its full history.
    ///
    /// The version ends at the last sequence, or 0 for an empty history.
    fn from_events(events: impl IntoIterator<Item = (Version, Self::Event)>) -> Self {
        let mut aggregate = Self::default();
        aggregate.replay(events);
        aggregate
    }
}

/// Trait for aggregates that support snapshotting.
///
/// Snapshots only shorten replay. The aggregate state is serialized whole
/// every `snapshot_interval` versions.
pub trait SnapshotCapable: Aggregate + Serialize + DeserializeOwned {
    /// Number of versions between snapshots.
    fn snapshot_interval() -> i64 {
        100
    }

    /// Returns whether moving from `previous` to the current version crossed
    /// a snapshot boundary.
    fn should_snapshot(&self, previous: Version) -> bool {
        let interval = Self::snapshot_interval();
        interval > 0 && self.version().as_i64() / interval > previous.as_i64() / interval
    }
}
