//! Prompt assembly for profile synthesis.
//!
//! Two builders: `full` reads the whole tiered corpus from scratch,
//! `incremental` hands the model its own previous profile plus the
//! ingestion delta and asks for an update. Both pin the response to the
//! same fixed JSON shape so the parse chain has one target.

use perceptor_core::profile::Profile;

/// A system/user prompt pair ready to become a completion request.
#[derive(Debug, Clone)]
pub struct SynthesisPrompt {
    pub system: String,
    pub user: String,
}

const ANALYST_ROLE: &str = "You are a perceptive analyst building a living profile of one person \
from their own digital activity. Work only from the evidence in the activity log. Be specific \
and concrete; prefer observed detail over generic summary. Never invent activity that is not \
in the log.";

const PROFILE_SHAPE: &str = r#"Respond with a single JSON object and nothing else, in exactly this shape:
{
  "identity_anchor": "two or three sentences on who this person is at the core",
  "active_threads": [
    {
      "name": "short thread name",
      "description": "what is happening in this thread right now",
      "intensity": "high|medium|low",
      "platforms": ["platforms where this thread shows up"],
      "recent_signals": ["concrete evidence drawn from the activity log"]
    }
  ],
  "recent_details": "granular detail from the last two weeks",
  "background_context": "longer-arc context that is no longer day-to-day active",
  "world_state": "what is going on around this person right now",
  "voice_pattern": {
    "tone": "how they sound",
    "vocabulary": ["words and phrases they actually use"],
    "style": "sentence rhythm, formality, quirks",
    "example_phrases": ["short phrases in their own register"]
  }
}"#;

/// Build the from-scratch synthesis prompt over the full tiered corpus.
pub fn full(sources: &[String], event_count: u64, corpus: &str) -> SynthesisPrompt {
    let system = format!("{ANALYST_ROLE}\n\n{PROFILE_SHAPE}");

    let user = format!(
        "Activity log for one person. Sources: {}. Total events on record: {}.\n\n\
         The log is split into recency tiers; the most recent tier carries the most detail.\n\n\
         {}\n\n\
         Build the profile.",
        sources.join(", "),
        event_count,
        corpus,
    );

    SynthesisPrompt { system, user }
}

/// Build the update prompt: previous profile plus the ingestion delta.
pub fn incremental(
    previous: &Profile,
    delta: &str,
    new_events: usize,
    total_events: u64,
) -> SynthesisPrompt {
    let system = format!("{ANALYST_ROLE}\n\n{PROFILE_SHAPE}");

    let previous_json =
        serde_json::to_string_pretty(previous).unwrap_or_else(|_| "{}".to_string());

    let user = format!(
        "Here is the profile you previously built for this person:\n\n\
         {}\n\n\
         Since then, {} new events were ingested ({} total on record). \
         The new activity:\n\n\
         {}\n\n\
         Produce the updated profile. Preserve threads the new activity does not touch, \
         evolve threads with fresh signals, retire threads that have gone quiet, and add \
         threads the new activity genuinely opens. Rewrite recent_details from the new \
         activity, and roll material that is no longer recent into background_context.",
        previous_json, new_events, total_events, delta,
    );

    SynthesisPrompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perceptor_core::profile::{ActiveThread, ThreadIntensity};

    fn previous_profile() -> Profile {
        Profile {
            user_id: "ada".into(),
            identity_anchor: "Systems engineer who thinks in invariants".into(),
            active_threads: vec![ActiveThread {
                name: "storage engine".into(),
                description: "rewriting the LSM compactor".into(),
                intensity: ThreadIntensity::High,
                platforms: vec!["github".into()],
                recent_signals: vec!["14 commits this week".into()],
            }],
            recent_details: "Deep in compaction benchmarks".into(),
            background_context: "Previously shipped the replication layer".into(),
            world_state: "Team is mid-migration".into(),
            voice_pattern: None,
            sources: vec!["github".into()],
            event_count: 912,
            model: "claude-sonnet-4-20250514".into(),
            reasoning_tokens: 1800,
            cost_usd: 0.34,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn shape_instruction_names_every_profile_field() {
        let prompt = full(&["github".into()], 10, "[Recent Activity]\n...");
        for field in [
            "identity_anchor",
            "active_threads",
            "recent_details",
            "background_context",
            "world_state",
            "voice_pattern",
            "recent_signals",
        ] {
            assert!(prompt.system.contains(field), "system prompt missing {field}");
        }
    }

    #[test]
    fn full_prompt_carries_sources_counts_and_corpus() {
        let prompt = full(
            &["github".into(), "discord".into()],
            912,
            "[Recent Activity: last 2 weeks]\ncommit: fix compaction stall",
        );
        assert!(prompt.user.contains("github, discord"));
        assert!(prompt.user.contains("912"));
        assert!(prompt.user.contains("fix compaction stall"));
    }

    #[test]
    fn incremental_prompt_embeds_the_previous_profile() {
        let prompt = incremental(&previous_profile(), "[New Activity]\n...", 48, 960);
        assert!(prompt.user.contains("Systems engineer who thinks in invariants"));
        assert!(prompt.user.contains("storage engine"));
        assert!(prompt.user.contains("48 new events"));
        assert!(prompt.user.contains("960 total"));
        assert!(prompt.user.contains("[New Activity]"));
    }

    #[test]
    fn incremental_prompt_spells_out_thread_lifecycle() {
        let prompt = incremental(&previous_profile(), "delta", 1, 2);
        for verb in ["Preserve", "evolve", "retire", "add"] {
            assert!(prompt.user.contains(verb), "update instruction missing {verb}");
        }
        assert!(prompt.user.contains("background_context"));
    }
}
