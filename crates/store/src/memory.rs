//! In-memory store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use perceptor_core::error::StoreError;
use perceptor_core::event::{ActivityEvent, EventQuery, InsertOutcome, NewEvent};
use perceptor_core::profile::Profile;
use perceptor_core::store::EventStore;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store backed by Vecs.
///
/// Mirrors the SQLite backend's contract exactly, including duplicate
/// classification at insert time; the dedup scan runs under the write lock
/// so concurrent inserts cannot race past each other.
pub struct MemoryStore {
    events: Arc<RwLock<Vec<ActivityEvent>>>,
    profiles: Arc<RwLock<Vec<Profile>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            profiles: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_duplicate(existing: &ActivityEvent, candidate: &NewEvent) -> bool {
    let external_dup = match (&candidate.external_id, &existing.external_id) {
        (Some(new_ext), Some(old_ext)) => {
            existing.user_id == candidate.user_id
                && existing.source == candidate.source
                && new_ext == old_ext
        }
        _ => false,
    };
    let natural_dup = existing.source == candidate.source
        && existing.user_id == candidate.user_id
        && existing.occurred_at == candidate.occurred_at
        && existing.title == candidate.title;
    external_dup || natural_dup
}

#[async_trait]
impl EventStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_event(&self, event: NewEvent) -> Result<InsertOutcome, StoreError> {
        let mut events = self.events.write().await;
        if events.iter().any(|e| is_duplicate(e, &event)) {
            return Ok(InsertOutcome::Duplicate);
        }

        let event_id = Uuid::new_v4().to_string();
        events.push(ActivityEvent {
            id: event_id.clone(),
            user_id: event.user_id,
            source: event.source,
            event_type: event.event_type,
            title: event.title,
            content: event.content,
            metadata: event.metadata,
            occurred_at: event.occurred_at,
            ingested_at: Utc::now(),
            external_id: event.external_id,
        });
        Ok(InsertOutcome::Inserted { event_id })
    }

    async fn events(&self, query: EventQuery) -> Result<Vec<ActivityEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matched: Vec<ActivityEvent> = events
            .iter()
            .filter(|e| e.user_id == query.user_id)
            .filter(|e| query.since.is_none_or(|bound| e.occurred_at >= bound))
            .filter(|e| query.before.is_none_or(|bound| e.occurred_at < bound))
            .filter(|e| {
                query
                    .source
                    .as_ref()
                    .is_none_or(|source| &e.source == source)
            })
            .cloned()
            .collect();

        matched.sort_by_key(|e| e.occurred_at);

        // A limit keeps the newest rows: drop from the front
        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.drain(..matched.len() - limit);
            }
        }

        Ok(matched)
    }

    async fn count_events(&self, user_id: &str) -> Result<u64, StoreError> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| e.user_id == user_id).count() as u64)
    }

    async fn sources(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let events = self.events.read().await;
        let mut sources: Vec<String> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .map(|e| e.source.clone())
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn events_ingested_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, StoreError> {
        let events = self.events.read().await;
        let mut matched: Vec<ActivityEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id && e.ingested_at > since)
            .cloned()
            .collect();
        matched.sort_by_key(|e| e.occurred_at);
        Ok(matched)
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), StoreError> {
        self.profiles.write().await.push(profile.clone());
        Ok(())
    }

    async fn latest_profile(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_event(source: &str, title: &str, occurred_at: DateTime<Utc>) -> NewEvent {
        NewEvent {
            user_id: "ada".into(),
            source: source.into(),
            event_type: "note".into(),
            title: title.into(),
            content: format!("content of {title}"),
            metadata: None,
            occurred_at,
            external_id: None,
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_ingestion_time() {
        let store = MemoryStore::new();
        let before = Utc::now();
        let outcome = store
            .insert_event(make_event("github", "commit", Utc::now() - Duration::days(3)))
            .await
            .unwrap();

        let InsertOutcome::Inserted { event_id } = outcome else {
            panic!("expected insert");
        };
        assert!(!event_id.is_empty());

        let events = store.events(EventQuery::for_user("ada")).await.unwrap();
        assert!(events[0].ingested_at >= before);
    }

    #[tokio::test]
    async fn both_dedup_rules_apply() {
        let store = MemoryStore::new();
        let when = Utc::now();

        let mut with_ext = make_event("github", "push", when);
        with_ext.external_id = Some("abc".into());
        store.insert_event(with_ext.clone()).await.unwrap();

        // External-id collision
        with_ext.title = "other title".into();
        with_ext.occurred_at = when + Duration::hours(2);
        assert_eq!(
            store.insert_event(with_ext).await.unwrap(),
            InsertOutcome::Duplicate
        );

        // Natural-key collision, no external ids involved
        store
            .insert_event(make_event("discord", "hello", when))
            .await
            .unwrap();
        let mut natural = make_event("discord", "hello", when);
        natural.content = "different words".into();
        assert_eq!(
            store.insert_event(natural).await.unwrap(),
            InsertOutcome::Duplicate
        );

        assert_eq!(store.count_events("ada").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn query_is_ascending_and_limit_keeps_newest() {
        let store = MemoryStore::new();
        let base = Utc::now() - Duration::days(10);
        // Insert out of chronological order
        for day in [4_i64, 1, 3, 0, 2] {
            store
                .insert_event(make_event("github", &format!("day {day}"), base + Duration::days(day)))
                .await
                .unwrap();
        }

        let all = store.events(EventQuery::for_user("ada")).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["day 0", "day 1", "day 2", "day 3", "day 4"]);

        let tail = store
            .events(EventQuery::for_user("ada").with_limit(2))
            .await
            .unwrap();
        let titles: Vec<&str> = tail.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["day 3", "day 4"]);
    }

    #[tokio::test]
    async fn profile_latest_by_created_at() {
        let store = MemoryStore::new();
        let mut profile = Profile {
            user_id: "ada".into(),
            identity_anchor: "old".into(),
            active_threads: vec![],
            recent_details: String::new(),
            background_context: String::new(),
            world_state: String::new(),
            voice_pattern: None,
            sources: vec![],
            event_count: 0,
            model: "claude-sonnet-4-20250514".into(),
            reasoning_tokens: 0,
            cost_usd: 0.0,
            created_at: Utc::now() - Duration::days(1),
        };
        store.save_profile(&profile).await.unwrap();

        profile.identity_anchor = "new".into();
        profile.created_at = Utc::now();
        store.save_profile(&profile).await.unwrap();

        let latest = store.latest_profile("ada").await.unwrap().unwrap();
        assert_eq!(latest.identity_anchor, "new");
        assert!(store.latest_profile("grace").await.unwrap().is_none());
    }
}
