use tracing_subscriber::EnvFilter;

use kingdom_server::config::ServerConfig;
use kingdom_server::server::Server;
use kingdom_server::state::AppState;
use kingdom_server::{build_app, standalone};

#[tokio::main]
async fn main() {
    let json_logs = std::env::var("KINGDOM_LOG_JSON").is_ok_and(|v| v == "1");
    if json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    tracing::info!("Kingdom server starting");

    let mut config = ServerConfig::load();
    config.validate();
    let admin_addr = config.admin_addr.clone();
    let parts = standalone::headless_parts(&config.remote);

    let mut server = Server::start(config, parts).await;

    let app = build_app(AppState::from_server(&server));
    match tokio::net::TcpListener::bind(&admin_addr).await {
        Ok(listener) => {
            tracing::info!("Admin API listening on {admin_addr}");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Admin API server error");
                }
            });
        },
        Err(e) => {
            tracing::error!(
                addr = %admin_addr,
                error = %e,
                "Failed to bind admin API, continuing without it"
            );
        },
    }

    let lifecycle = server.lifecycle().clone();
    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            }
            true
        }
        () = server.stopped() => false,
    };
    if interrupted {
        tracing::info!("Interrupted, stopping engine loop");
        lifecycle.stop();
        server.stopped().await;
    }

    server.unbind();
    tracing::info!(running = server.running(), "Kingdom server exited");
}
