//! HTTP transport for the insights service
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/contextual_insights/insights` | Generate insights for a verse, topic or text snippet |
//! | `GET`  | `/api/contextual_insights/health` | Liveness check |
//!
//! Errors are always `{"error": "..."}`: 400 for validation and
//! normalization failures, 502 when the inference server is unavailable,
//! 500 for anything else (including handler panics).

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as CorsAny, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::error::InsightError;
use crate::insights::{InsightAggregator, InsightKind};

pub const INSIGHTS_PATH: &str = "/api/contextual_insights/insights";
pub const HEALTH_PATH: &str = "/api/contextual_insights/health";

/// Shared state for HTTP server
#[derive(Clone)]
pub struct HttpState {
    pub aggregator: Arc<InsightAggregator>,
}

/// Inbound body: `{type, reference | topic | text, translation?}`
#[derive(Debug, Deserialize)]
struct InsightBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    reference: Option<String>,
    topic: Option<String>,
    text: Option<String>,
    translation: Option<String>,
}

/// Error wrapper that renders as `{"error": message}`
pub struct ApiError(InsightError);

impl From<InsightError> for ApiError {
    fn from(err: InsightError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::info!("Rejected request: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Insight generation endpoint
pub async fn insights_handler(
    State(state): State<HttpState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let Json(raw) =
        body.map_err(|e| InsightError::validation(format!("invalid JSON body: {}", e)))?;
    let body: InsightBody = serde_json::from_value(raw)
        .map_err(|e| InsightError::validation(format!("invalid request body: {}", e)))?;

    let kind: InsightKind = body
        .kind
        .as_deref()
        .ok_or_else(|| InsightError::validation("type is required"))?
        .parse()?;
    let input = match kind {
        InsightKind::Verse => body.reference,
        InsightKind::Topic => body.topic.or(body.text),
        InsightKind::TextSnippet => body.text,
    }
    .unwrap_or_default();

    let (prepared, outcome) = state
        .aggregator
        .insights_for(kind, &input, body.translation.as_deref())
        .await?;

    let request = &prepared.request;
    let field = match kind {
        InsightKind::Verse => "reference",
        InsightKind::Topic => "topic",
        InsightKind::TextSnippet => "text",
    };
    let mut input_echo = json!({
        "type": kind,
        "translation": request.translation,
    });
    input_echo[field] = json!(request.reference_or_text);
    if kind == InsightKind::Verse && prepared.original_input != request.reference_or_text {
        input_echo["original_reference"] = json!(prepared.original_input);
    }

    let elapsed = started.elapsed();
    tracing::info!(
        %request_id,
        kind = kind.as_str(),
        degraded = outcome.is_degraded(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Insight request served"
    );

    Ok(Json(json!({
        "input": input_echo,
        "insights": outcome,
        "processing_time_seconds": (elapsed.as_secs_f64() * 1000.0).round() / 1000.0,
    })))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Handler panicked: {}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("Internal error: {}", message) })),
    )
        .into_response()
}

/// Build the application router
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route(INSIGHTS_PATH, post(insights_handler))
        .route(HEALTH_PATH, get(health_handler))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(CorsAny)
                .allow_methods(CorsAny)
                .allow_headers(CorsAny),
        )
        .with_state(state)
}

/// Start the HTTP server and run until Ctrl-C
pub async fn start_http_server(
    config: &Config,
    aggregator: Arc<InsightAggregator>,
) -> anyhow::Result<()> {
    let app = router(HttpState { aggregator });

    let listener = tokio::net::TcpListener::bind(config.runtime.http_bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!(
        "Starting HTTP server on {} (insights at {})",
        config.runtime.http_bind,
        INSIGHTS_PATH
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down HTTP server");
}
