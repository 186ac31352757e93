//! Health check endpoint

use axum::{Json, extract::State as AxumState};
use serde_json::{Value, json};

use crate::SharedState;

/// GET / - liveness and a summary of the loaded configuration
pub async fn root(AxumState(state): AxumState<SharedState>) -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "started_at": state.started_at,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "targets": state.targets.len(),
    }))
}
