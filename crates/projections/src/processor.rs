//! Feeds committed events from the log to registered projections.

use event_store::{EventEnvelope, EventStore};
use futures_util::StreamExt;

use crate::Result;
use crate::projection::Projection;

/// Delivers the event log to a set of projections.
///
/// At startup [`run_catch_up`](Self::run_catch_up) replays the whole log in
/// global order. Each projection only receives the events past its own
/// position, so repeated runs deliver just the new tail.
pub struct ProjectionProcessor<S: EventStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: EventStore> ProjectionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    pub fn register(&mut self, projection: Box<dyn Projection>) {
        tracing::debug!(projection = projection.name(), "Registered projection");
        self.projections.push(projection);
    }

    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Replays the log into every projection that is behind.
    ///
    /// Returns the number of events in the log.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut log = self.store.stream_all_events().await?;
        let mut index: u64 = 0;
        let mut delivered: u64 = 0;

        while let Some(event) = log.next().await {
            let event = event?;
            index += 1;

            for projection in &self.projections {
                if projection.position().await.is_behind(index) {
                    projection.handle(&event).await?;
                    delivered += 1;
                }
            }
        }

        metrics::counter!("projections_events_processed").increment(delivered);
        tracing::info!(log_events = index, delivered, "Projection catch-up complete");

        Ok(index)
    }

    /// Hands one freshly committed event to every projection.
    #[tracing::instrument(skip(self, event), fields(stream_id = %event.stream_id, sequence = %event.sequence))]
    pub async fn process_event(&self, event: &EventEnvelope) -> Result<()> {
        for projection in &self.projections {
            projection.handle(event).await?;
        }
        metrics::counter!("projections_events_processed").increment(self.projections.len() as u64);
        Ok(())
    }

    /// Resets every projection and replays the log from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            projection.reset().await?;
            tracing::info!(projection = projection.name(), "Projection reset");
        }
        self.run_catch_up().await
    }
}
