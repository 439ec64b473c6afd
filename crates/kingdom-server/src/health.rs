use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::stats::StatsSnapshot;
use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Whether the engine started.
    pub initialized: bool,
    /// False once the update shutdown has fired.
    pub running: bool,
    pub stats: StatsSnapshot,
}

/// GET /health. Always 200; `status` is `degraded` when the engine did not
/// start or the server has shut down.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let running = state.lifecycle.running();
    let status = if state.initialized && running {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        initialized: state.initialized,
        running,
        stats: state.stats.snapshot(),
    })
}

/// GET /ready. Ready while the engine is up and the tick loop still takes
/// commands.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if !state.initialized {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: engine not started");
    }
    if !state.lifecycle.is_attached() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: engine loop stopped");
    }
    (StatusCode::OK, "ready")
}
