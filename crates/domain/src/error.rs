//! Domain error types.

use common::StreamId;
use event_store::EventStoreError;
use thiserror::Error;

use crate::cart::CartError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// A cart rule rejected the command.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// Every attempt of a command lost the optimistic-concurrency race.
    #[error("Gave up on {aggregate_id} after {attempts} conflicting attempts")]
    ConcurrencyRetriesExhausted {
        aggregate_id: StreamId,
        attempts: u32,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true when the error came from a stale expected version.
    pub fn is_conflict(&self) -> bool {
        match self {
            DomainError::EventStore(e) => e.is_conflict(),
            DomainError::ConcurrencyRetriesExhausted { .. } => true,
            _ => false,
        }
    }
}
