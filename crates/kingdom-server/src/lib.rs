pub mod api;
pub mod attributes;
pub mod auth;
pub mod config;
pub mod engine_loop;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod redis_store;
pub mod remote;
pub mod server;
pub mod standalone;
pub mod state;
pub mod stats;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the admin API router.
pub fn build_app(state: AppState) -> Router<()> {
    // Lifecycle and attribute routes (behind bearer auth middleware)
    let api_routes = Router::new()
        .route("/lifecycle", get(api::get_lifecycle))
        .route("/lifecycle/shutdown", post(api::schedule_shutdown))
        .route(
            "/lifecycle/pvp",
            post(api::start_pvp).delete(api::cancel_pvp),
        )
        .route("/lifecycle/duel", axum::routing::delete(api::end_duel))
        .route(
            "/players/{user}/attributes/{key}",
            get(api::get_attribute).put(api::put_attribute),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_layer,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Middleware wrapper that injects AuthConfig into request extensions for the
/// bearer auth middleware.
async fn bearer_auth_layer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Result<axum::response::Response, axum::http::StatusCode> {
    request.extensions_mut().insert(state.auth.clone());
    auth::bearer_auth_middleware(request.headers().clone(), request, next).await
}
