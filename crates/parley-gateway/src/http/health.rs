use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;

/// GET /health: liveness check with server metadata.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let agents = state.memory.count_agents().unwrap_or_else(|e| {
        warn!(error = %e, "health: agent count failed");
        0
    });
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "agents": agents,
        "discord_connected": state.outbound.is_connected(),
    }))
}
