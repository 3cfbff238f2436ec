//! Event-stream thinning: prefix dedup and proportional source sampling.
//!
//! Both transforms are order-preserving within a source and deterministic
//! for identical inputs.

use perceptor_core::event::ActivityEvent;
use std::collections::{BTreeMap, HashSet};

/// How much of the content participates in duplicate detection.
pub const PREFIX_DEDUP_CHARS: usize = 500;

/// Drop any event whose leading content prefix was already seen in this
/// batch, keeping the first occurrence. Repeated cross-posts (the same
/// note synced from two collectors) collapse to one entry.
pub fn dedup_by_prefix(mut events: Vec<ActivityEvent>) -> Vec<ActivityEvent> {
    let mut seen = HashSet::new();
    events.retain(|event| {
        let prefix: String = event.content.chars().take(PREFIX_DEDUP_CHARS).collect();
        seen.insert(prefix)
    });
    events
}

/// Thin a tier to roughly `target_per_source` events per source.
///
/// Groups by source, keeps every stride-th element within each group
/// (stride = max(1, group size / target)), then recombines sorted by
/// occurrence time ascending. High-volume sources shrink the most, so a
/// chatty platform cannot crowd a quiet one out of the corpus.
pub fn sample_by_source(events: Vec<ActivityEvent>, target_per_source: usize) -> Vec<ActivityEvent> {
    if events.is_empty() || target_per_source == 0 {
        return events;
    }

    let mut groups: BTreeMap<String, Vec<ActivityEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.source.clone()).or_default().push(event);
    }

    let mut sampled = Vec::new();
    for group in groups.into_values() {
        let stride = (group.len() / target_per_source).max(1);
        sampled.extend(group.into_iter().step_by(stride));
    }

    sampled.sort_by_key(|event| event.occurred_at);
    sampled
}
