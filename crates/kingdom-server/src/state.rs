use std::sync::Arc;

use crate::attributes::PlayerAttributeStore;
use crate::auth::AuthConfig;
use crate::engine_loop::LifecycleHandle;
use crate::server::Server;
use crate::stats::ServerStats;

/// Shared state for the admin API handlers.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: LifecycleHandle,
    pub attributes: PlayerAttributeStore,
    pub auth: AuthConfig,
    /// Whether the engine came up at startup.
    pub initialized: bool,
    pub stats: Arc<ServerStats>,
}

impl AppState {
    pub fn new(
        lifecycle: LifecycleHandle,
        attributes: PlayerAttributeStore,
        auth: AuthConfig,
        initialized: bool,
    ) -> Self {
        Self {
            lifecycle,
            attributes,
            auth,
            initialized,
            stats: Arc::new(ServerStats::new()),
        }
    }

    pub fn from_server(server: &Server) -> Self {
        let auth = AuthConfig {
            bearer_token: server.config().auth.bearer_token.clone(),
        };
        Self {
            lifecycle: server.lifecycle().clone(),
            attributes: server.attributes().clone(),
            auth,
            initialized: server.is_initialized(),
            stats: server.stats(),
        }
    }
}
