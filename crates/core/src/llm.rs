//! LlmClient trait — the abstraction over LLM chat-completion backends.
//!
//! A client takes a role-tagged message list plus a system instruction and
//! returns the finished completion with usage accounting attached. Retry,
//! streaming transport, and cost calculation are implementation concerns
//! behind this seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// The role of a message in a chat-completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Extended-reasoning configuration for a completion call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Token budget granted to the model's internal reasoning phase.
    pub budget_tokens: u32,
}

/// One chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<ChatMessage>,

    /// System instruction, sent out-of-band from the messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Output-token cap
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Enable extended reasoning with the given budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
}

fn default_temperature() -> f32 {
    1.0
}

/// A finished completion with usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// Concatenated text-typed output blocks
    pub text: String,

    /// Concatenated reasoning-typed output blocks
    #[serde(default)]
    pub reasoning: String,

    pub input_tokens: u32,
    pub output_tokens: u32,

    /// Estimated reasoning share of `output_tokens`; observability only
    #[serde(default)]
    pub reasoning_tokens: u32,

    /// Which model actually responded
    pub model: String,

    /// Estimated cost of this call, USD
    #[serde(default)]
    pub cost_usd: f64,
}

/// The core LlmClient trait.
///
/// The orchestrator calls `complete()` without knowing which backend or
/// transport is behind it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send a request and wait for the finished completion.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, LlmError>;
}
