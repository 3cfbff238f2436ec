//! Parsing the model's JSON output into a profile draft.
//!
//! Two stages: a strict parse of the whole response, then a fallback that
//! extracts the outermost `{...}` span (models wrap JSON in prose or code
//! fences despite instructions). If both fail the error carries a short
//! excerpt of the raw output, and the caller must not retry: the same
//! prompt would buy the same malformed answer at full price.

use perceptor_core::error::SynthesisError;
use perceptor_core::profile::{ActiveThread, VoicePattern};
use serde::Deserialize;

const EXCERPT_CHARS: usize = 200;

/// The model-authored portion of a profile. Identity, accounting, and
/// timestamp fields are attached by the orchestrator afterwards.
#[derive(Debug, Deserialize)]
pub struct ProfileDraft {
    pub identity_anchor: String,

    #[serde(default)]
    pub active_threads: Vec<ActiveThread>,

    #[serde(default)]
    pub recent_details: String,

    #[serde(default)]
    pub background_context: String,

    #[serde(default)]
    pub world_state: String,

    #[serde(default)]
    pub voice_pattern: Option<VoicePattern>,
}

/// Parse the raw completion text into a draft.
pub fn parse_profile(raw: &str) -> Result<ProfileDraft, SynthesisError> {
    let trimmed = raw.trim();

    let mut reason = match serde_json::from_str::<ProfileDraft>(trimmed) {
        Ok(draft) => return Ok(draft),
        Err(e) => e.to_string(),
    };

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            match serde_json::from_str::<ProfileDraft>(&trimmed[start..=end]) {
                Ok(draft) => return Ok(draft),
                // The extracted span is the model's actual attempt, so its
                // parse error is the closer diagnosis.
                Err(e) => reason = e.to_string(),
            }
        }
    }

    Err(SynthesisError::ParseFailed {
        reason,
        excerpt: excerpt(raw),
    })
}

fn excerpt(raw: &str) -> String {
    let head: String = raw.chars().take(EXCERPT_CHARS).collect();
    if raw.chars().count() > EXCERPT_CHARS {
        format!("{head}...")
    } else {
        head
    }
}
