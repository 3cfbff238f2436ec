//! Synthesized profile domain types.
//!
//! A profile is one point-in-time LLM synthesis of who the user is and
//! what they currently care about. Profiles are append-only: each synthesis
//! produces a new row, and the most recent by creation time is the sole
//! input to the next incremental run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One synthesized snapshot of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,

    /// Stable who-this-person-is narrative
    pub identity_anchor: String,

    /// Ordered list of what the user is actively working on or into
    #[serde(default)]
    pub active_threads: Vec<ActiveThread>,

    /// Granular detail from the recent window
    #[serde(default)]
    pub recent_details: String,

    /// Longer-arc context that is no longer day-to-day active
    #[serde(default)]
    pub background_context: String,

    /// What is going on around the user right now
    #[serde(default)]
    pub world_state: String,

    /// How the user writes and talks, when inferable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_pattern: Option<VoicePattern>,

    /// Distinct sources that fed this synthesis
    #[serde(default)]
    pub sources: Vec<String>,

    /// Total stored events at synthesis time
    #[serde(default)]
    pub event_count: u64,

    /// Model that produced this profile
    pub model: String,

    /// Estimated reasoning-phase share of the output tokens
    #[serde(default)]
    pub reasoning_tokens: u32,

    /// Estimated cost of the synthesis call, USD
    #[serde(default)]
    pub cost_usd: f64,

    pub created_at: DateTime<Utc>,
}

/// One active thread of the user's life: a project, an obsession, a situation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveThread {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub intensity: ThreadIntensity,

    /// Platforms where this thread shows up
    #[serde(default)]
    pub platforms: Vec<String>,

    /// Concrete evidentiary signals from the corpus
    #[serde(default)]
    pub recent_signals: Vec<String>,
}

/// How hot a thread currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadIntensity {
    High,
    #[default]
    Medium,
    Low,
}

impl ThreadIntensity {
    /// Lenient parse: case-insensitive, unrecognized input falls back to
    /// `Medium` rather than failing the whole profile parse.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

// LLM output is not trusted to spell the variant exactly, so deserialization
// goes through the lossy parser instead of the derive.
impl<'de> Deserialize<'de> for ThreadIntensity {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_str_lossy(&raw))
    }
}

impl std::fmt::Display for ThreadIntensity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{label}")
    }
}

/// How the user communicates, inferred from their own writing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePattern {
    #[serde(default)]
    pub tone: String,

    #[serde(default)]
    pub vocabulary: Vec<String>,

    #[serde(default)]
    pub style: String,

    #[serde(default)]
    pub example_phrases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intensity_round_trip() {
        let json = serde_json::to_string(&ThreadIntensity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let back: ThreadIntensity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ThreadIntensity::High);
    }

    #[test]
    fn intensity_tolerates_sloppy_input() {
        let parsed: ThreadIntensity = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, ThreadIntensity::High);
        let parsed: ThreadIntensity = serde_json::from_str("\"  low \"").unwrap();
        assert_eq!(parsed, ThreadIntensity::Low);
        let parsed: ThreadIntensity = serde_json::from_str("\"blazing\"").unwrap();
        assert_eq!(parsed, ThreadIntensity::Medium);
    }

    #[test]
    fn thread_defaults_fill_missing_fields() {
        let thread: ActiveThread =
            serde_json::from_str(r#"{"name": "rust rewrite"}"#).unwrap();
        assert_eq!(thread.name, "rust rewrite");
        assert_eq!(thread.intensity, ThreadIntensity::Medium);
        assert!(thread.platforms.is_empty());
        assert!(thread.recent_signals.is_empty());
    }

    #[test]
    fn profile_serialization_round_trip() {
        let profile = Profile {
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
            sources: vec!["github".into(), "discord".into()],
            event_count: 912,
            model: "claude-sonnet-4-20250514".into(),
            reasoning_tokens: 1800,
            cost_usd: 0.34,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_id, "ada");
        assert_eq!(back.active_threads.len(), 1);
        assert_eq!(back.active_threads[0].intensity, ThreadIntensity::High);
        assert_eq!(back.event_count, 912);
    }
}
