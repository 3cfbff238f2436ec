//! `perceptor serve` — Start the HTTP API server.

use std::sync::Arc;

use chrono::Utc;
use perceptor_api::ApiState;
use perceptor_config::AppConfig;
use perceptor_ingest::IngestGateway;
use perceptor_synthesis::Synthesizer;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.api.port = port;
    }

    let store = super::open_store(&config).await?;
    let (llm, _meter) = super::build_llm(&config);
    let gateway = IngestGateway::new(store.clone(), &config.user_id);
    let synthesizer = Synthesizer::new(store.clone(), llm, super::synthesis_options(&config));

    let state = Arc::new(ApiState {
        user_id: config.user_id.clone(),
        store,
        gateway,
        synthesizer,
        start_time: Utc::now(),
    });

    println!("👁  Perceptor API");
    println!("   Listening: {}:{}", config.api.host, config.api.port);
    println!("   User:      {}", config.user_id);
    if !config.has_api_key() {
        println!("   ⚠️  No API key — POST /v1/synthesize will fail until one is set");
    }

    perceptor_api::serve(state, &config.api.host, config.api.port).await?;

    Ok(())
}
