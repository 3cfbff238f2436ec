//! EventStore trait — durable event timeline and profile history.
//!
//! The store is the one stateful collaborator in the pipeline. It enforces
//! both uniqueness rules at insert time (so concurrent gateway submissions
//! need no read-before-write), serves ranged timeline queries to the
//! curator, and keeps the append-only profile history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::event::{ActivityEvent, EventQuery, InsertOutcome, NewEvent};
use crate::profile::Profile;

/// The core EventStore trait.
///
/// Implementations: SQLite, in-memory (for testing and ephemeral runs).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Offer a candidate event. The store assigns the event ID and the
    /// ingestion timestamp, and classifies a uniqueness violation on either
    /// dedup key as [`InsertOutcome::Duplicate`] rather than an error.
    async fn insert_event(&self, event: NewEvent)
        -> std::result::Result<InsertOutcome, StoreError>;

    /// Ranged query, `occurred_at` ascending. A `limit` keeps the newest rows.
    async fn events(&self, query: EventQuery)
        -> std::result::Result<Vec<ActivityEvent>, StoreError>;

    /// Total stored events for a user.
    async fn count_events(&self, user_id: &str) -> std::result::Result<u64, StoreError>;

    /// Distinct sources that have ever contributed an event for a user.
    async fn sources(&self, user_id: &str) -> std::result::Result<Vec<String>, StoreError>;

    /// Events whose INGESTION time is after `since`, `occurred_at` ascending.
    /// This is the incremental-synthesis feed: backfilled history surfaces
    /// here even when the events themselves are old.
    async fn events_ingested_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> std::result::Result<Vec<ActivityEvent>, StoreError>;

    /// Append a new profile version.
    async fn save_profile(&self, profile: &Profile) -> std::result::Result<(), StoreError>;

    /// The most recent profile by creation time, if any.
    async fn latest_profile(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<Profile>, StoreError>;

    /// Creation time of the latest profile, if any.
    async fn latest_profile_created_at(
        &self,
        user_id: &str,
    ) -> std::result::Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.latest_profile(user_id).await?.map(|p| p.created_at))
    }
}
