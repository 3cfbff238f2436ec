//! The ingestion gateway — per-submission pipeline and batch loop.
//!
//! Pipeline order: required fields, metadata shape, timestamp
//! normalization, credential redaction, then a single store insert that
//! classifies duplicates. Every failure is an in-band result value; the
//! gateway itself never returns an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use perceptor_core::event::{InsertOutcome, NewEvent};
use perceptor_core::store::EventStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::redact::redact_credentials;

/// One raw submission as a collector sends it. Every field defaults so
/// that required-field validation produces this crate's own messages
/// instead of serde's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSubmission {
    pub source: String,
    pub event_type: String,
    pub title: String,
    pub content: String,
    /// A mapping, or a string that JSON-decodes to a mapping
    pub metadata: Option<Value>,
    /// ISO calendar timestamp, any offset; omitted means "now"
    pub timestamp: Option<String>,
    pub external_id: Option<String>,
}

/// Result of a single submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResult {
    Ok { event_id: String },
    Duplicate,
    Error { error: String },
}

/// Aggregate result of a batch submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub total: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Entries whose content was altered by credential redaction
    pub filtered: usize,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Ok,
    PartialError,
}

/// One failed batch entry, by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub error: String,
}

/// Metadata arrives duck-typed; resolve it ONCE at the boundary into a
/// tagged outcome before anything downstream runs.
enum MetadataOutcome {
    Absent,
    Mapping(serde_json::Map<String, Value>),
    Invalid(String),
}

fn resolve_metadata(raw: Option<&Value>) -> MetadataOutcome {
    const SHAPE_ERROR: &str = "Metadata must be a mapping or a JSON-encoded mapping";
    match raw {
        None | Some(Value::Null) => MetadataOutcome::Absent,
        Some(Value::Object(map)) => MetadataOutcome::Mapping(map.clone()),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => MetadataOutcome::Mapping(map),
            _ => MetadataOutcome::Invalid(SHAPE_ERROR.into()),
        },
        Some(_) => MetadataOutcome::Invalid(SHAPE_ERROR.into()),
    }
}

/// Parse a supplied timestamp, accepting any offset; offset-less values
/// are interpreted as UTC. Omitted means the current instant, which is
/// always UTC-aware (a naive-local default here once caused silent
/// timezone corruption downstream).
fn resolve_timestamp(raw: Option<&str>) -> Result<DateTime<Utc>, String> {
    let Some(raw) = raw else {
        return Ok(Utc::now());
    };
    let raw = raw.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err("Invalid timestamp".into())
}

/// The ingestion gateway for one user's timeline.
pub struct IngestGateway {
    store: Arc<dyn EventStore>,
    user_id: String,
}

impl IngestGateway {
    pub fn new(store: Arc<dyn EventStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Submit one event. All failures come back as [`SubmitResult::Error`].
    pub async fn submit(&self, submission: RawSubmission) -> SubmitResult {
        self.process(submission).await.0
    }

    /// Submit a sequence of raw values, order preserved. Each element is
    /// independently validated; a failed element never aborts the rest.
    pub async fn submit_batch(&self, entries: Vec<Value>) -> BatchReport {
        let total = entries.len();
        let mut inserted = 0;
        let mut duplicates = 0;
        let mut filtered = 0;
        let mut errors = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            let submission = match entry {
                Value::Object(_) => match serde_json::from_value::<RawSubmission>(entry) {
                    Ok(submission) => submission,
                    Err(e) => {
                        errors.push(BatchError {
                            index,
                            error: format!("Malformed submission: {e}"),
                        });
                        continue;
                    }
                },
                _ => {
                    errors.push(BatchError {
                        index,
                        error: "Batch element must be a mapping of submission fields".into(),
                    });
                    continue;
                }
            };

            let (result, was_redacted) = self.process(submission).await;
            if was_redacted {
                filtered += 1;
            }
            match result {
                SubmitResult::Ok { .. } => inserted += 1,
                SubmitResult::Duplicate => duplicates += 1,
                SubmitResult::Error { error } => errors.push(BatchError { index, error }),
            }
        }

        let status = if errors.is_empty() {
            BatchStatus::Ok
        } else {
            BatchStatus::PartialError
        };
        BatchReport {
            status,
            total,
            inserted,
            duplicates,
            filtered,
            errors,
        }
    }

    /// The per-submission pipeline. The bool reports whether redaction
    /// altered the content (feeds the batch `filtered` counter).
    async fn process(&self, submission: RawSubmission) -> (SubmitResult, bool) {
        for (field, value) in [
            ("source", &submission.source),
            ("event_type", &submission.event_type),
            ("content", &submission.content),
        ] {
            if value.trim().is_empty() {
                return (
                    SubmitResult::Error {
                        error: format!("Missing required field: {field}"),
                    },
                    false,
                );
            }
        }

        let metadata = match resolve_metadata(submission.metadata.as_ref()) {
            MetadataOutcome::Absent => None,
            MetadataOutcome::Mapping(map) => Some(map),
            MetadataOutcome::Invalid(error) => return (SubmitResult::Error { error }, false),
        };

        let occurred_at = match resolve_timestamp(submission.timestamp.as_deref()) {
            Ok(instant) => instant,
            Err(error) => return (SubmitResult::Error { error }, false),
        };

        let (content, was_redacted) = redact_credentials(&submission.content);
        let source = submission.source;
        let event_type = submission.event_type;
        let title = submission.title;

        let event = NewEvent {
            user_id: self.user_id.clone(),
            source: source.clone(),
            event_type: event_type.clone(),
            title: title.clone(),
            content,
            metadata,
            occurred_at,
            external_id: submission.external_id,
        };

        match self.store.insert_event(event).await {
            Ok(InsertOutcome::Inserted { event_id }) => {
                info!(source = %source, event_type = %event_type, title = %title, redacted = was_redacted, "Ingested event");
                (SubmitResult::Ok { event_id }, was_redacted)
            }
            Ok(InsertOutcome::Duplicate) => (SubmitResult::Duplicate, was_redacted),
            Err(e) => (
                SubmitResult::Error {
                    error: format!("Store rejected event: {e}"),
                },
                was_redacted,
            ),
        }
    }
}
