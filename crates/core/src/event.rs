//! Activity event domain types.
//!
//! An event is one recorded unit of user activity from some platform:
//! a commit pushed, a message sent, a page bookmarked. Events flow through
//! the ingestion gateway once, are stored immutably, and are read many
//! times by the timeline curator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single validated, redacted, stored activity record.
///
/// Invariants: `content` never contains credential-shaped substrings after
/// gateway processing; `occurred_at` is UTC-normalized; rows are unique on
/// (user_id, source, external_id) when an external id is present, and on
/// (source, user_id, occurred_at, title) always. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Unique event ID, assigned by the store
    pub id: String,

    /// The user this activity belongs to
    pub user_id: String,

    /// Platform the activity came from (e.g., "github", "discord")
    pub source: String,

    /// Kind of activity within the source (e.g., "commit", "message")
    pub event_type: String,

    /// Short human-readable title; may be empty
    #[serde(default)]
    pub title: String,

    /// Free-text body, post-redaction
    pub content: String,

    /// Optional structured attributes supplied by the collector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,

    /// When the activity happened
    pub occurred_at: DateTime<Utc>,

    /// When the store accepted it, set at insert time
    pub ingested_at: DateTime<Utc>,

    /// Collector-supplied identifier for exact-once submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl ActivityEvent {
    /// A short summary string from metadata, if the collector stored one.
    pub fn metadata_summary(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("summary"))
            .and_then(|v| v.as_str())
    }
}

/// A candidate event: validated and redacted by the gateway, not yet stored.
///
/// The store assigns `id` and `ingested_at` when it accepts the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub user_id: String,
    pub source: String,
    pub event_type: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

/// What happened when a candidate event was offered to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Stored as a new row, with the assigned event ID.
    Inserted { event_id: String },
    /// Rejected by one of the two uniqueness rules. Not an error.
    Duplicate,
}

/// A ranged query over stored events for one user.
///
/// Results come back in `occurred_at` ascending order; when `limit` is set,
/// it keeps the NEWEST matching rows (the tail of the window), since recency
/// is what the curator cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventQuery {
    pub user_id: String,

    /// Inclusive lower bound on `occurred_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound on `occurred_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateTime<Utc>>,

    /// Restrict to one source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Cap on row count, keeping the newest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
