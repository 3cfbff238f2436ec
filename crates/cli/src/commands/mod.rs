//! Subcommand implementations for the `perceptor` binary.
//!
//! Each command loads config, composes the pieces it needs, and reports
//! through stdout. Shared composition helpers live here so every command
//! builds the stack the same way.

pub mod batch;
pub mod corpus;
pub mod init;
pub mod push;
pub mod serve;
pub mod status;
pub mod synthesize;

use std::sync::Arc;

use perceptor_config::AppConfig;
use perceptor_core::{EventStore, LlmClient};
use perceptor_providers::{AnthropicClient, UsageMeter};
use perceptor_store::{MemoryStore, SqliteStore};
use perceptor_synthesis::SynthesisOptions;

/// Open the configured store backend.
///
/// `backend = "memory"` gives an ephemeral in-process store; anything else
/// opens (and auto-migrates) the SQLite file resolved by the config.
pub(crate) async fn open_store(
    config: &AppConfig,
) -> Result<Arc<dyn EventStore>, Box<dyn std::error::Error>> {
    if config.store.backend == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let path = config.store_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
    }

    let store = SqliteStore::new(&path.to_string_lossy())
        .await
        .map_err(|e| format!("Failed to open store at {}: {e}", path.display()))?;
    Ok(Arc::new(store))
}

/// Build the Anthropic client plus the usage meter that tallies its calls.
pub(crate) fn build_llm(config: &AppConfig) -> (Arc<dyn LlmClient>, Arc<UsageMeter>) {
    let meter = Arc::new(UsageMeter::new());
    let api_key = config.provider.api_key.clone().unwrap_or_default();
    let client =
        AnthropicClient::new(api_key, meter.clone()).with_base_url(&config.provider.base_url);
    (Arc::new(client), meter)
}

/// Map config knobs onto synthesis options.
pub(crate) fn synthesis_options(config: &AppConfig) -> SynthesisOptions {
    SynthesisOptions {
        model: config.model.clone(),
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        reasoning_budget: config
            .synthesis
            .reasoning
            .then_some(config.synthesis.reasoning_budget),
    }
}
