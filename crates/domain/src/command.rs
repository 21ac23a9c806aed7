//! Command handling infrastructure.

use std::marker::PhantomData;
use std::time::Duration;

use common::StreamId;
use event_store::{
    AppendOptions, EventEnvelope, EventStore, EventStoreExt, NewEvent, Snapshot, Version,
};
use rand::Rng;
use serde::{Serialize, de::DeserializeOwned};

use crate::aggregate::{Aggregate, DomainEvent, SnapshotCapable};
use crate::error::DomainError;

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after applying the new events.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The envelopes the store committed, with their assigned sequences.
    pub committed: Vec<EventEnvelope>,

    /// The new version of the aggregate after the command.
    pub new_version: Version,

    /// How many attempts the command took, 1 when no conflict occurred.
    pub attempts: u32,
}

/// Bounds and pacing for re-running a command after a version conflict.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: u32,

    /// Delay unit; the wait after attempt `n` is `base_delay * n`.
    pub base_delay: Duration,

    /// Adds a random extra wait of up to half the base delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(50),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            jitter: true,
        }
    }

    /// Disables jitter, making delays predictable.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total attempts allowed. Never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let linear = self.base_delay.saturating_mul(attempt);
        if !self.jitter {
            return linear;
        }

        let max_jitter_ms = u64::try_from(self.base_delay.as_millis() / 2).unwrap_or(u64::MAX);
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter_ms)
        };
        linear.saturating_add(Duration::from_millis(jitter_ms))
    }
}

/// Handler for executing commands against aggregates.
///
/// The handler is responsible for:
/// 1. Loading the aggregate from the event store (with optional snapshot)
/// 2. Executing the command to produce events
/// 3. Persisting the events with an expected-version check
/// 4. Saving a snapshot when a boundary is crossed
/// 5. Re-running the command when another writer got there first
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: SnapshotCapable,
    A::Event: Serialize + DeserializeOwned,
{
    /// Creates a new command handler with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate from the event store.
    ///
    /// Starts from the latest snapshot when one exists and replays the
    /// events after it. If the stream doesn't exist, returns a default
    /// instance.
    pub async fn load(&self, aggregate_id: StreamId) -> Result<A, DomainError> {
        let (snapshot, events) = self.store.load_stream(aggregate_id).await?;

        let mut aggregate = match snapshot {
            Some(snapshot) => self.restore_from_snapshot(snapshot)?,
            None => A::default(),
        };

        let tail = events
            .into_iter()
            .map(|envelope| -> Result<_, DomainError> {
                Ok((envelope.sequence, envelope.decode::<A::Event>()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        aggregate.replay(tail);

        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load_existing(&self, aggregate_id: StreamId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        if aggregate.id().is_some() {
            Ok(Some(aggregate))
        } else {
            Ok(None)
        }
    }

    /// Executes a command once and persists the resulting events.
    ///
    /// The command function receives the current aggregate state and returns
    /// either a list of events to apply, or an error. A stale expected
    /// version surfaces as `DomainError::EventStore` with a conflict.
    pub async fn execute<F>(
        &self,
        aggregate_id: StreamId,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = command_fn(&aggregate)?;

        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events: vec![],
                committed: vec![],
                new_version: current_version,
                attempts: 1,
            });
        }

        // Apply first so the owner is known even for the creating event
        for event in &events {
            aggregate.apply(event.clone());
        }
        let owner = aggregate
            .owner()
            .cloned()
            .ok_or_else(|| DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: aggregate_id.to_string(),
            })?;

        let pending = events
            .iter()
            .map(|event| NewEvent::from_payload(owner.clone(), event.event_type(), event))
            .collect::<Result<Vec<_>, _>>()?;

        let options = if current_version == Version::initial() {
            AppendOptions::expect_new()
        } else {
            AppendOptions::expect_version(current_version)
        };

        let committed = self.store.append(aggregate_id, pending, options).await?;
        let new_version = committed
            .last()
            .map(|envelope| envelope.sequence)
            .unwrap_or(current_version);
        aggregate.set_version(new_version);

        if aggregate.should_snapshot(current_version) {
            self.save_snapshot(aggregate_id, &aggregate).await;
        }

        Ok(CommandResult {
            aggregate,
            events,
            committed,
            new_version,
            attempts: 1,
        })
    }

    /// Executes a command, re-running it against fresh state whenever the
    /// append loses an optimistic-concurrency race.
    ///
    /// Rule violations and storage failures return immediately. After
    /// `policy.attempts()` conflicting attempts the command gives up with
    /// `DomainError::ConcurrencyRetriesExhausted`.
    #[tracing::instrument(skip(self, policy, command_fn), fields(aggregate = A::aggregate_type()))]
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: StreamId,
        policy: &RetryPolicy,
        command_fn: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let max_attempts = policy.attempts();

        for attempt in 1..=max_attempts {
            match self.execute(aggregate_id, &command_fn).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    return Ok(result);
                }
                Err(DomainError::EventStore(e)) if e.is_conflict() => {
                    metrics::counter!("command_conflicts_total").increment(1);
                    tracing::warn!(attempt, max_attempts, error = %e, "Version conflict");

                    if attempt < max_attempts {
                        tokio::time::sleep(policy.delay_for(attempt)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        metrics::counter!("command_retries_exhausted_total").increment(1);
        tracing::error!(attempts = max_attempts, "Retries exhausted");

        Err(DomainError::ConcurrencyRetriesExhausted {
            aggregate_id,
            attempts: max_attempts,
        })
    }

    async fn save_snapshot(&self, aggregate_id: StreamId, aggregate: &A) {
        let snapshot = match Snapshot::from_state(aggregate_id, aggregate.version(), aggregate) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(%aggregate_id, error = %e, "Failed to serialize snapshot");
                return;
            }
        };

        match self.store.save_snapshot(snapshot).await {
            Ok(()) => {
                tracing::debug!(%aggregate_id, version = %aggregate.version(), "Snapshot saved");
            }
            Err(e) => {
                tracing::warn!(%aggregate_id, error = %e, "Failed to save snapshot");
            }
        }
    }

    fn restore_from_snapshot(&self, snapshot: Snapshot) -> Result<A, DomainError> {
        let version = snapshot.version;
        let mut aggregate: A = snapshot.into_state()?;
        aggregate.set_version(version);
        Ok(aggregate)
    }
}
