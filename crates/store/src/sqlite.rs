//! SQLite store backend.
//!
//! One database file with two tables:
//! - `events` — the immutable activity timeline
//! - `profiles` — append-only synthesized profile history
//!
//! Two unique indexes on `events` carry the dedup rules: a partial index on
//! (user_id, source, external_id) for collector-supplied identifiers, and a
//! full index on (source, user_id, occurred_at, title) as the natural key.
//! An insert that trips either index is classified as a duplicate, which
//! keeps concurrent gateway submissions race-free without any pre-check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perceptor_core::error::StoreError;
use perceptor_core::event::{ActivityEvent, EventQuery, InsertOutcome, NewEvent};
use perceptor_core::profile::Profile;
use perceptor_core::store::EventStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite event/profile store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `":memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Each pooled connection to ":memory:" opens its own database, so
        // an in-memory store must stay on a single connection.
        let is_memory = path.contains(":memory:") || path.contains("mode=memory");

        let pool = SqlitePoolOptions::new()
            .max_connections(if is_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations — creates tables and all indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL,
                source       TEXT NOT NULL,
                event_type   TEXT NOT NULL,
                title        TEXT NOT NULL DEFAULT '',
                content      TEXT NOT NULL,
                metadata     TEXT,
                occurred_at  TEXT NOT NULL,
                ingested_at  TEXT NOT NULL,
                external_id  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("events table: {e}")))?;

        // Dedup rule 1: collector-supplied identifier, when present
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_external
            ON events(user_id, source, external_id)
            WHERE external_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("external_id index: {e}")))?;

        // Dedup rule 2: natural key, always
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_events_natural
            ON events(source, user_id, occurred_at, title)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("natural key index: {e}")))?;

        // Timeline reads are always per-user, by occurrence or ingestion time
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_occurred ON events(user_id, occurred_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("occurred_at index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_events_ingested ON events(user_id, ingested_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("ingested_at index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      TEXT NOT NULL,
                document     TEXT NOT NULL,
                created_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("profiles table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_profiles_user ON profiles(user_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("profiles index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Parse an `ActivityEvent` from a SQLite row.
    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ActivityEvent, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let source: String = row
            .try_get("source")
            .map_err(|e| StoreError::QueryFailed(format!("source column: {e}")))?;
        let event_type: String = row
            .try_get("event_type")
            .map_err(|e| StoreError::QueryFailed(format!("event_type column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let metadata_json: Option<String> = row
            .try_get("metadata")
            .map_err(|e| StoreError::QueryFailed(format!("metadata column: {e}")))?;
        let occurred_at_str: String = row
            .try_get("occurred_at")
            .map_err(|e| StoreError::QueryFailed(format!("occurred_at column: {e}")))?;
        let ingested_at_str: String = row
            .try_get("ingested_at")
            .map_err(|e| StoreError::QueryFailed(format!("ingested_at column: {e}")))?;
        let external_id: Option<String> = row
            .try_get("external_id")
            .map_err(|e| StoreError::QueryFailed(format!("external_id column: {e}")))?;

        let metadata = match metadata_json {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| StoreError::QueryFailed(format!("metadata column: {e}")))?,
            ),
            None => None,
        };

        Ok(ActivityEvent {
            id,
            user_id,
            source,
            event_type,
            title,
            content,
            metadata,
            occurred_at: parse_timestamp(&occurred_at_str, "occurred_at")?,
            ingested_at: parse_timestamp(&ingested_at_str, "ingested_at")?,
            external_id,
        })
    }
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_event(&self, event: NewEvent) -> Result<InsertOutcome, StoreError> {
        let event_id = Uuid::new_v4().to_string();
        let ingested_at = Utc::now();
        let metadata_json = match &event.metadata {
            Some(map) => Some(
                serde_json::to_string(map)
                    .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?,
            ),
            None => None,
        };

        let result = sqlx::query(
            r#"
            INSERT INTO events
                (id, user_id, source, event_type, title, content,
                 metadata, occurred_at, ingested_at, external_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&event_id)
        .bind(&event.user_id)
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(&event.title)
        .bind(&event.content)
        .bind(&metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .bind(ingested_at.to_rfc3339())
        .bind(&event.external_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Stored event {event_id}");
                Ok(InsertOutcome::Inserted { event_id })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!(
                    source = %event.source,
                    title = %event.title,
                    "Duplicate event rejected by uniqueness index"
                );
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(StoreError::Storage(format!("INSERT failed: {e}"))),
        }
    }

    async fn events(&self, query: EventQuery) -> Result<Vec<ActivityEvent>, StoreError> {
        // Fetch newest-first so LIMIT keeps the tail of the window, then
        // reverse back to ascending. Negative LIMIT means unlimited in SQLite.
        let limit: i64 = query.limit.map(|n| n as i64).unwrap_or(-1);
        let since = query.since.map(|t| t.to_rfc3339());
        let before = query.before.map(|t| t.to_rfc3339());

        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE user_id = ?1
              AND (?2 IS NULL OR occurred_at >= ?2)
              AND (?3 IS NULL OR occurred_at < ?3)
              AND (?4 IS NULL OR source = ?4)
            ORDER BY occurred_at DESC, rowid DESC
            LIMIT ?5
            "#,
        )
        .bind(&query.user_id)
        .bind(&since)
        .bind(&before)
        .bind(&query.source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Event query: {e}")))?;

        let mut events = rows
            .iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>, _>>()?;
        events.reverse();
        Ok(events)
    }

    async fn count_events(&self, user_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM events WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as u64)
    }

    async fn sources(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT source FROM events WHERE user_id = ?1 ORDER BY source",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Sources query: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get("source")
                    .map_err(|e| StoreError::QueryFailed(format!("source column: {e}")))
            })
            .collect()
    }

    async fn events_ingested_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM events
            WHERE user_id = ?1 AND ingested_at > ?2
            ORDER BY occurred_at ASC, rowid ASC
            "#,
        )
        .bind(user_id)
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Ingestion query: {e}")))?;

        rows.iter().map(Self::row_to_event).collect()
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        let document = serde_json::to_string(profile)
            .map_err(|e| StoreError::Storage(format!("Profile serialization: {e}")))?;

        sqlx::query(
            "INSERT INTO profiles (user_id, document, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&profile.user_id)
        .bind(&document)
        .bind(profile.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Profile INSERT failed: {e}")))?;

        debug!(user_id = %profile.user_id, "Saved profile version");
        Ok(())
    }

    async fn latest_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT document FROM profiles
            WHERE user_id = ?1
            ORDER BY created_at DESC, iid DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Latest profile: {e}")))?;

        match row {
            Some(r) => {
                let document: String = r
                    .try_get("document")
                    .map_err(|e| StoreError::QueryFailed(format!("document column: {e}")))?;
                let profile = serde_json::from_str(&document)
                    .map_err(|e| StoreError::QueryFailed(format!("Profile parse: {e}")))?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }
}
