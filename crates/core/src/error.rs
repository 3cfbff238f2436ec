//! Error types for the Perceptor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; gateway-level validation
//! failures are NOT here — they are in-band result values, never errors.

use thiserror::Error;

/// The top-level error type for all Perceptor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- LLM provider errors ---
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    // --- Synthesis errors ---
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures from the event/profile store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures from the LLM backend.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Rate limits clear on their own and transport-level failures are
    /// usually momentary; everything else (bad auth, malformed request,
    /// server-side validation) will fail identically on a second attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network(_))
    }
}

/// Failures from a synthesis run. Gateway failures never appear here;
/// these are the only raised errors in the pipeline.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Profile parse failed: {reason}; raw output started: {excerpt}")]
    ParseFailed { reason: String, excerpt: String },

    #[error("No stored activity to synthesize for user {0}")]
    EmptyCorpus(String),
}
