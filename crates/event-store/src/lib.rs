//! Append-only event log for cart streams.
//!
//! The store allocates per-stream sequence numbers, enforces optimistic
//! concurrency on append, and keeps the latest snapshot of each stream.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod snapshot;
pub mod store;

pub use common::{StreamId, UserId};
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, NewEvent, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use snapshot::Snapshot;
pub use store::{AppendOptions, EventStore, EventStoreExt, EventStream};
