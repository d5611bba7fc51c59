//! REST API handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Daemon liveness and last-run summary
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last = state.last_report().await;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at,
        "running": state.is_running(),
        "dry_run": state.runner.options().dry_run,
        "last_run": last.map(|r| serde_json::json!({
            "id": r.id,
            "finished_at": r.finished_at,
            "devices": r.devices.len(),
        })),
    }))
}

/// Full report of the most recent run
pub async fn get_report(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.last_report().await {
        Some(report) => Json(report).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("No sync has run yet")),
        )
            .into_response(),
    }
}

/// Trigger a sync run and wait for its report
pub async fn trigger_sync(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Manual sync triggered");

    match state.try_sync().await {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => (
            StatusCode::CONFLICT,
            Json(ApiError::new("A sync is already running")),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Manual sync failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(format!("Sync failed: {:#}", e))),
            )
                .into_response()
        }
    }
}
