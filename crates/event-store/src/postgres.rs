use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventEnvelope, EventId, EventStoreError, NewEvent, Result, Snapshot, StreamId, UserId,
    Version,
    store::{AppendOptions, EventStore, EventStream, validate_events_for_append},
};

const EVENT_COLUMNS: &str =
    "id, stream_id, user_id, sequence, event_type, timestamp, payload, metadata";

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            stream_id: StreamId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            sequence: Version::new(row.try_get("sequence")?),
            event_type: row.try_get("event_type")?,
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn fetch_events(
        &self,
        sql: &str,
        stream_id: StreamId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(sql)
            .bind(stream_id.as_uuid())
            .bind(from.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(
        &self,
        stream_id: StreamId,
        events: Vec<NewEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        validate_events_for_append(&events)?;

        let mut tx = self.pool.begin().await?;

        // Serialize appenders of the same stream for the rest of the transaction
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(stream_id.to_string())
            .execute(&mut *tx)
            .await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let current_version = Version::new(current.unwrap_or(0));

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual: current_version,
            });
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut sequence = current_version;
        for event in events {
            sequence = sequence.next();
            let envelope = event.commit(stream_id, sequence);
            let metadata_json = serde_json::to_value(&envelope.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, stream_id, user_id, sequence, event_type, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(envelope.event_id.as_uuid())
            .bind(stream_id.as_uuid())
            .bind(envelope.user_id.as_str())
            .bind(sequence.as_i64())
            .bind(&envelope.event_type)
            .bind(envelope.timestamp)
            .bind(&envelope.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_stream_sequence")
                {
                    return EventStoreError::ConcurrencyConflict {
                        stream_id,
                        expected: options.expected_version.unwrap_or(current_version),
                        actual: sequence,
                    };
                }
                EventStoreError::Database(e)
            })?;

            committed.push(envelope);
        }

        tx.commit().await?;

        metrics::counter!("events_appended_total").increment(committed.len() as u64);

        Ok(committed)
    }

    async fn read_stream(&self, stream_id: StreamId) -> Result<Vec<EventEnvelope>> {
        self.read_stream_from(stream_id, Version::first()).await
    }

    async fn read_stream_from(
        &self,
        stream_id: StreamId,
        from: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE stream_id = $1 AND sequence >= $2 ORDER BY sequence ASC"
        );
        self.fetch_events(&sql, stream_id, from).await
    }

    async fn read_by_user(&self, user_id: &UserId) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM (
                SELECT *, MIN(position) OVER (PARTITION BY stream_id) AS stream_position
                FROM events
                WHERE user_id = $1
            ) AS owned
            ORDER BY stream_position ASC, sequence ASC
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(user_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_version(&self, stream_id: StreamId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY position ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Vec<_>>();

        let stream = stream::iter(events);
        Ok(Box::pin(stream))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (stream_id, version, timestamp, state)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (stream_id) DO UPDATE SET
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            WHERE snapshots.version < EXCLUDED.version
            "#,
        )
        .bind(snapshot.stream_id.as_uuid())
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, stream_id: StreamId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT stream_id, version, timestamp, state
            FROM snapshots
            WHERE stream_id = $1
            "#,
        )
        .bind(stream_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                stream_id: StreamId::from_uuid(row.try_get::<Uuid, _>("stream_id")?),
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }
}
