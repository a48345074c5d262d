use crate::config;
use crate::models::InvestigationStatus;
use crate::orchestrator::{InvestigationRequest, Investigator};
use crate::telemetry;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub investigator: Investigator,
}

/// Build the HTTP router for the investigation service.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/invocations", post(invoke))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/ping", get(ping))
        .with_state(state)
}

/// Serve until the process is terminated.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("listening on {host}:{port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn invoke(State(state): State<Arc<AppState>>, body: String) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": format!("malformed JSON: {e}")})),
            )
                .into_response();
        }
    };

    let request = match InvestigationRequest::from_payload(&payload) {
        Ok(request) => request,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": error})),
            )
                .into_response();
        }
    };

    let report = state.investigator.investigate(request).await;
    let status_code = match report.status {
        InvestigationStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status_code, Json(report.to_response())).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "cloudpilot",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "cloudpilot",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": {
            "region": state.investigator.region(),
            "telemetry_initialized": telemetry::telemetry_initialized(),
            "enrichment_enabled": config::enrichment_enabled(),
        },
        "endpoints": {
            "investigations": "/invocations",
            "health": "/health",
            "status": "/status",
            "ping": "/ping",
        },
    }))
}

async fn ping() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
