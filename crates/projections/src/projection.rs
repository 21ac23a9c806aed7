//! The projection contract and how far into the log a projection has read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::EventEnvelope;

use crate::Result;

/// How far a projection has read into the global event log.
///
/// The log is read in global append order, so the number of events seen
/// doubles as a cursor: a catch-up run skips the first `events_seen` events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionPosition {
    pub events_seen: u64,

    /// Commit time of the last event seen.
    pub last_event_at: Option<DateTime<Utc>>,
}

impl ProjectionPosition {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns the position after `event` has been seen.
    ///
    /// Events that were skipped as duplicates or gaps still count.
    pub fn record(&self, event: &EventEnvelope) -> Self {
        Self {
            events_seen: self.events_seen.saturating_add(1),
            last_event_at: Some(event.timestamp),
        }
    }

    /// True if the event at 1-based global `index` has not been seen yet.
    pub fn is_behind(&self, index: u64) -> bool {
        self.events_seen < index
    }
}

impl std::fmt::Display for ProjectionPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.last_event_at {
            Some(at) => write!(f, "{} events, last at {}", self.events_seen, at.to_rfc3339()),
            None => write!(f, "{} events", self.events_seen),
        }
    }
}

/// Folds committed events into a read model.
///
/// A projection never decides anything: it may lag, be reset, and be
/// rebuilt from the log at any time.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Folds one committed event. Must tolerate duplicates.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;

    async fn position(&self) -> ProjectionPosition;

    /// Drops everything, returning to position zero.
    async fn reset(&self) -> Result<()>;
}
