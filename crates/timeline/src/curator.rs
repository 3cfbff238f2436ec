//! Corpus assembly pipeline.
//!
//! Builds one bounded text block from three recency tiers, windows
//! relative to "now" in UTC:
//!
//! 1. **Recent** (last 2 weeks) - full detail, 400k char budget, newest 500
//! 2. **Medium** (2 to 8 weeks) - one-line summaries, 120k chars, newest 2,000
//! 3. **Background** (over 8 weeks) - title and date, newest 5,000
//!
//! Every tier is prefix-deduped. Medium is down-sampled per source only
//! when it still exceeds 400 events after dedup; Background is always
//! sampled. The Background budget is soft: sampling bounds it, there is
//! no hard cut.
//!
//! The incremental variant replaces the tiers with a single full-detail
//! section of events selected by ingestion time, so backfilled history
//! surfaces no matter how old its occurrence timestamps are.

use chrono::{DateTime, Duration, Utc};
use perceptor_core::error::StoreError;
use perceptor_core::event::{ActivityEvent, EventQuery};
use perceptor_core::store::EventStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::sample::{dedup_by_prefix, sample_by_source};

// ── Tier constants ────────────────────────────────────────────────────────

const RECENT_WINDOW_DAYS: i64 = 14;
const MEDIUM_WINDOW_DAYS: i64 = 56;

const RECENT_CHAR_BUDGET: usize = 400_000;
const MEDIUM_CHAR_BUDGET: usize = 120_000;

const RECENT_FETCH_CAP: usize = 500;
const MEDIUM_FETCH_CAP: usize = 2_000;
const BACKGROUND_FETCH_CAP: usize = 5_000;

const RECENT_MIN_ALLOTMENT: usize = 500;
const MEDIUM_MIN_ALLOTMENT: usize = 200;

const MEDIUM_SAMPLE_THRESHOLD: usize = 400;
const MEDIUM_TARGET_PER_SOURCE: usize = 120;
const BACKGROUND_TARGET_PER_SOURCE: usize = 70;

const BACKGROUND_LINE_CAP: usize = 160;

// ── Types ─────────────────────────────────────────────────────────────────

/// Per-tier assembly counters, surfaced in logs and the corpus view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStats {
    pub name: String,
    /// Rows fetched from the store before thinning
    pub fetched: usize,
    /// Events that survived dedup and sampling into the rendered text
    pub rendered: usize,
    /// Characters this tier contributed
    pub chars: usize,
}

/// The assembled corpus: one text block with tier headers, plus counters.
/// Consumed verbatim as prompt content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub text: String,
    pub event_count: usize,
    pub tiers: Vec<TierStats>,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.event_count == 0
    }
}

// ── Curator ───────────────────────────────────────────────────────────────

/// Reads the event store and assembles prompt corpora. Stateless between
/// calls; windows and budgets are fixed constants.
pub struct TimelineCurator {
    store: Arc<dyn EventStore>,
}

impl TimelineCurator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Assemble the full three-tier corpus for one user.
    pub async fn corpus(&self, user_id: &str) -> Result<Corpus, StoreError> {
        let now = Utc::now();
        let recent_start = now - Duration::days(RECENT_WINDOW_DAYS);
        let medium_start = now - Duration::days(MEDIUM_WINDOW_DAYS);

        let mut sections = Vec::new();
        let mut tiers = Vec::with_capacity(3);

        let recent_raw = self
            .store
            .events(
                EventQuery::for_user(user_id)
                    .with_since(recent_start)
                    .with_limit(RECENT_FETCH_CAP),
            )
            .await?;
        let fetched = recent_raw.len();
        let recent = dedup_by_prefix(recent_raw);
        let section = render_full_tier("[Recent Activity: last 2 weeks]", &recent, RECENT_CHAR_BUDGET);
        push_tier(&mut sections, &mut tiers, "recent", fetched, recent.len(), section);

        let medium_raw = self
            .store
            .events(
                EventQuery::for_user(user_id)
                    .with_since(medium_start)
                    .with_before(recent_start)
                    .with_limit(MEDIUM_FETCH_CAP),
            )
            .await?;
        let fetched = medium_raw.len();
        let mut medium = dedup_by_prefix(medium_raw);
        if medium.len() > MEDIUM_SAMPLE_THRESHOLD {
            medium = sample_by_source(medium, MEDIUM_TARGET_PER_SOURCE);
        }
        let section = render_summary_tier("[Earlier Activity: 2 to 8 weeks ago]", &medium);
        push_tier(&mut sections, &mut tiers, "medium", fetched, medium.len(), section);

        let background_raw = self
            .store
            .events(
                EventQuery::for_user(user_id)
                    .with_before(medium_start)
                    .with_limit(BACKGROUND_FETCH_CAP),
            )
            .await?;
        let fetched = background_raw.len();
        let background = sample_by_source(dedup_by_prefix(background_raw), BACKGROUND_TARGET_PER_SOURCE);
        let section = render_title_tier("[Background Activity: older than 8 weeks]", &background);
        push_tier(&mut sections, &mut tiers, "background", fetched, background.len(), section);

        let text = sections.join("\n\n");
        let event_count = tiers.iter().map(|t| t.rendered).sum();
        info!(
            user_id = %user_id,
            events = event_count,
            chars = text.chars().count(),
            "Assembled full corpus"
        );
        Ok(Corpus {
            text,
            event_count,
            tiers,
        })
    }

    /// Assemble the ingestion-delta corpus: only events the store accepted
    /// after `since`, in full detail under the Recent budget.
    pub async fn incremental_corpus(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Corpus, StoreError> {
        let raw = self.store.events_ingested_since(user_id, since).await?;
        let fetched = raw.len();
        let events = dedup_by_prefix(raw);
        let section = render_full_tier("[New Activity]", &events, RECENT_CHAR_BUDGET);

        let mut sections = Vec::new();
        let mut tiers = Vec::with_capacity(1);
        push_tier(&mut sections, &mut tiers, "new", fetched, events.len(), section);

        let text = sections.join("\n\n");
        info!(
            user_id = %user_id,
            events = events.len(),
            chars = text.chars().count(),
            "Assembled incremental corpus"
        );
        Ok(Corpus {
            text,
            event_count: events.len(),
            tiers,
        })
    }
}

fn push_tier(
    sections: &mut Vec<String>,
    tiers: &mut Vec<TierStats>,
    name: &str,
    fetched: usize,
    rendered: usize,
    section: String,
) {
    tiers.push(TierStats {
        name: name.into(),
        fetched,
        rendered,
        chars: section.chars().count(),
    });
    if !section.is_empty() {
        sections.push(section);
    }
}

// ── Tier renderers ────────────────────────────────────────────────────────

fn render_full_tier(header: &str, events: &[ActivityEvent], budget: usize) -> String {
    if events.is_empty() {
        return String::new();
    }
    let allotment = (budget / events.len()).max(RECENT_MIN_ALLOTMENT);
    let mut blocks = Vec::with_capacity(events.len() + 1);
    blocks.push(header.to_string());
    for event in events {
        blocks.push(render_full_event(event, allotment));
    }
    blocks.join("\n\n")
}

/// Full-detail block: header line, then any stored summary, then content.
/// The whole block is cut to the per-event allotment.
fn render_full_event(event: &ActivityEvent, allotment: usize) -> String {
    let mut block = format!(
        "[{}] {}/{}",
        event.occurred_at.format("%Y-%m-%d %H:%M"),
        event.source,
        event.event_type
    );
    let title = event.title.trim();
    if !title.is_empty() {
        block.push_str(": ");
        block.push_str(title);
    }
    if let Some(summary) = event.metadata_summary() {
        let summary = summary.trim();
        if !summary.is_empty() {
            block.push_str("\nsummary: ");
            block.push_str(summary);
        }
    }
    block.push('\n');
    block.push_str(event.content.trim());
    truncate_chars(block, allotment)
}

fn render_summary_tier(header: &str, events: &[ActivityEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let allotment = (MEDIUM_CHAR_BUDGET / events.len()).max(MEDIUM_MIN_ALLOTMENT);
    let mut lines = Vec::with_capacity(events.len() + 1);
    lines.push(header.to_string());
    for event in events {
        lines.push(render_summary_line(event, allotment));
    }
    lines.join("\n")
}

/// One line per event: date, source, type, title, then the stored summary
/// or the first content line as the gist.
fn render_summary_line(event: &ActivityEvent, allotment: usize) -> String {
    let gist = event
        .metadata_summary()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| first_line(&event.content));
    let mut line = format!(
        "[{}] {}/{}",
        event.occurred_at.format("%Y-%m-%d"),
        event.source,
        event.event_type
    );
    let title = event.title.trim();
    if !title.is_empty() {
        line.push_str(": ");
        line.push_str(title);
    }
    if !gist.is_empty() {
        line.push_str(" | ");
        line.push_str(gist);
    }
    truncate_chars(line, allotment)
}

fn render_title_tier(header: &str, events: &[ActivityEvent]) -> String {
    if events.is_empty() {
        return String::new();
    }
    let mut lines = Vec::with_capacity(events.len() + 1);
    lines.push(header.to_string());
    for event in events {
        let date = event.occurred_at.format("%Y-%m-%d");
        let title = event.title.trim();
        let line = if title.is_empty() {
            format!("[{date}] ({})", event.event_type)
        } else {
            format!("[{date}] {title}")
        };
        lines.push(truncate_chars(line, BACKGROUND_LINE_CAP));
    }
    lines.join("\n")
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

/// Cut to at most `limit` characters, on a char boundary.
fn truncate_chars(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        text
    } else {
        text.chars().take(limit).collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
