//! Projection error types.

use common::StreamId;
use event_store::Version;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("Event log error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// A committed payload did not decode as a cart event.
    #[error("Cannot decode event {sequence} of stream {stream_id}: {source}")]
    Decode {
        stream_id: StreamId,
        sequence: Version,
        #[source]
        source: serde_json::Error,
    },
}

impl ProjectionError {
    pub fn decode(stream_id: StreamId, sequence: Version, source: serde_json::Error) -> Self {
        Self::Decode {
            stream_id,
            sequence,
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProjectionError>;
