// handlers/mod.rs - Handler tiers
//
// Public (no auth) → Protected (JWT auth). Every tier reports into the request
// log through the observability enrichment API.

use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::app::AppState;

pub mod protected; // JWT authentication required (/api/*)
pub mod public;    // No authentication required

/// GET / - service information
pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "reqtail",
            "version": version,
            "description": "Multi-tenant API shell with request-scoped logging and tail sampling",
            "endpoints": {
                "health": "/health, /api/health (public, not logged)",
                "session": "/api/_auth/session (public, not logged)",
                "whoami": "/api/auth/whoami (protected)",
                "todos": "/api/orgs/:slug/todos[/:id] (protected, organization scoped)",
            }
        }
    }))
}

/// GET /health - liveness plus the current slow-request threshold
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let tracker = state.observability.tracker();

    Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": chrono::Utc::now(),
            "slow_threshold_ms": tracker.threshold(),
            "latency_samples": tracker.sample_count(),
        }
    }))
}
