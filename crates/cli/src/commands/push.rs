//! `perceptor push` — Submit one activity event.

use perceptor_config::AppConfig;
use perceptor_ingest::{IngestGateway, RawSubmission, SubmitResult};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    source: String,
    event_type: String,
    title: String,
    content: String,
    metadata: Option<String>,
    timestamp: Option<String>,
    external_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = super::open_store(&config).await?;
    let gateway = IngestGateway::new(store, &config.user_id);

    // Metadata goes through as a raw string; the gateway decodes and
    // validates it the same way it would for an HTTP submission.
    let submission = RawSubmission {
        source,
        event_type,
        title,
        content,
        metadata: metadata.map(serde_json::Value::String),
        timestamp,
        external_id,
    };

    match gateway.submit(submission).await {
        SubmitResult::Ok { event_id } => {
            println!("✅ Ingested event {event_id}");
        }
        SubmitResult::Duplicate => {
            println!("⏭️  Duplicate — already on the timeline");
        }
        SubmitResult::Error { error } => {
            return Err(format!("Submission rejected: {error}").into());
        }
    }

    Ok(())
}
