//! HTTP API for Perceptor.
//!
//! Endpoints:
//!
//! - `POST /v1/events`        — Submit one activity event
//! - `POST /v1/events/batch`  — Submit an array of events
//! - `GET  /v1/status`        — Event count, sources, latest profile time
//! - `GET  /v1/profile`       — Latest synthesized profile
//! - `POST /v1/synthesize`    — Run a synthesis pass
//! - `GET  /health`           — Liveness
//!
//! Gateway outcomes stay in-band: a validation failure is a 400 whose body
//! IS the submit result, and a batch always answers 200 with its report.
//! Synthesis failures map provider and parse errors to 502.

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use perceptor_core::error::{StoreError, SynthesisError};
use perceptor_core::profile::Profile;
use perceptor_core::store::EventStore;
use perceptor_ingest::{BatchReport, IngestGateway, RawSubmission, SubmitResult};
use perceptor_synthesis::{SynthesisRequest, Synthesizer};

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the API.
pub struct ApiState {
    pub user_id: String,
    pub store: Arc<dyn EventStore>,
    pub gateway: IngestGateway,
    pub synthesizer: Synthesizer,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedApiState = Arc<ApiState>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the Axum router with all API routes.
pub fn router(state: SharedApiState) -> Router {
    Router::new()
        .route("/v1/events", post(submit_event_handler))
        .route("/v1/events/batch", post(submit_batch_handler))
        .route("/v1/status", get(status_handler))
        .route("/v1/profile", get(profile_handler))
        .route("/v1/synthesize", post(synthesize_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the API until the process is stopped.
pub async fn serve(
    state: SharedApiState,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let app = router(state);

    info!(addr = %addr, "Perceptor API listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ── Response types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusResponse {
    user_id: String,
    event_count: u64,
    sources: Vec<String>,
    latest_profile_at: Option<String>,
    uptime_secs: i64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn store_error(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn submit_event_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<RawSubmission>,
) -> (StatusCode, Json<SubmitResult>) {
    let result = state.gateway.submit(payload).await;
    let status = match &result {
        SubmitResult::Error { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::OK,
    };
    (status, Json(result))
}

async fn submit_batch_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<Vec<serde_json::Value>>,
) -> Json<BatchReport> {
    info!(total = payload.len(), "v1/events/batch request");
    Json(state.gateway.submit_batch(payload).await)
}

async fn status_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ErrorResponse>)> {
    let event_count = state
        .store
        .count_events(&state.user_id)
        .await
        .map_err(store_error)?;
    let sources = state
        .store
        .sources(&state.user_id)
        .await
        .map_err(store_error)?;
    let latest_profile_at = state
        .store
        .latest_profile_created_at(&state.user_id)
        .await
        .map_err(store_error)?;

    Ok(Json(StatusResponse {
        user_id: state.user_id.clone(),
        event_count,
        sources,
        latest_profile_at: latest_profile_at.map(|t| t.to_rfc3339()),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    }))
}

async fn profile_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<Profile>, StatusCode> {
    let profile = state
        .store
        .latest_profile(&state.user_id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    profile.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn synthesize_handler(
    State(state): State<SharedApiState>,
    Json(request): Json<SynthesisRequest>,
) -> Result<Json<Profile>, (StatusCode, Json<ErrorResponse>)> {
    info!(
        full = request.full,
        persist = request.persist,
        "v1/synthesize request"
    );

    match state.synthesizer.synthesize(&state.user_id, request).await {
        Ok(profile) => Ok(Json(profile)),
        Err(e) => {
            let status = match &e {
                SynthesisError::Llm(_) | SynthesisError::ParseFailed { .. } => {
                    StatusCode::BAD_GATEWAY
                }
                SynthesisError::EmptyCorpus(_) => StatusCode::BAD_REQUEST,
                SynthesisError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            Err((
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
