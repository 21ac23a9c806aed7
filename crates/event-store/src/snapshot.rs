use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{StreamId, Version};

/// A point-in-time copy of an aggregate's state.
///
/// Snapshots only shorten replay: loading starts from the snapshot and
/// applies the events after `version`. Dropping every snapshot must never
/// change what an aggregate loads as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub stream_id: StreamId,

    /// Sequence number of the last event folded into `state`.
    pub version: Version,

    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// The serialized aggregate state.
    pub state: serde_json::Value,
}

impl Snapshot {
    pub fn new(stream_id: StreamId, version: Version, state: serde_json::Value) -> Self {
        Self {
            stream_id,
            version,
            timestamp: Utc::now(),
            state,
        }
    }

    /// Creates a snapshot from a serializable state.
    pub fn from_state<T: Serialize>(
        stream_id: StreamId,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(stream_id, version, serde_json::to_value(state)?))
    }

    /// Deserializes the snapshot state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestState {
        items: Vec<String>,
        checked_out: bool,
    }

    #[test]
    fn snapshot_from_state_and_into_state() {
        let id = StreamId::new();
        let original = TestState {
            items: vec!["p1".to_string()],
            checked_out: false,
        };

        let snapshot = Snapshot::from_state(id, Version::new(10), &original).unwrap();
        assert_eq!(snapshot.stream_id, id);
        assert_eq!(snapshot.version, Version::new(10));

        let restored: TestState = snapshot.into_state().unwrap();
        assert_eq!(restored, original);
    }
}
