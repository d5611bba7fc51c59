//! Status server setup, routing, and the sync schedule

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::api;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/report", get(api::get_report))
        .route("/api/sync", post(api::trigger_sync))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run scheduled syncs forever; an interval of zero disables the schedule
pub async fn schedule(state: Arc<AppState>, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Scheduled sync disabled");
        return;
    }

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match state.try_sync().await {
            Ok(Some(report)) => info!(run = %report.id, "Scheduled sync complete"),
            Ok(None) => info!("Previous sync still running, skipping scheduled run"),
            Err(e) => error!(error = %e, "Scheduled sync failed"),
        }
    }
}

/// Serve the status API and run the schedule in the background
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state.clone());

    let interval_secs = state.config.daemon.interval_secs;
    tokio::spawn(schedule(state, interval_secs));

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "Starting status server");
    axum::serve(listener, app).await?;
    Ok(())
}
