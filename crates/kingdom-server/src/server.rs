use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use kingdom_core::world::{EngineError, GameEngine, World};

use crate::attributes::{LocalAttributes, PlayerAttributeStore, RemoteAttributes};
use crate::config::ServerConfig;
use crate::engine_loop::{LifecycleHandle, spawn_engine_loop};
use crate::lifecycle::{LifecycleController, LifecycleSettings};
use crate::remote::RemoteStore;
use crate::stats::ServerStats;

/// Receives every accepted game client connection.
pub trait ConnectionHandler: Send + Sync {
    fn on_connect(&self, stream: TcpStream, peer: SocketAddr);
}

/// Builds the connection handler once the engine is up.
pub type HandlerFactory =
    Box<dyn FnOnce(Arc<dyn GameEngine>) -> Arc<dyn ConnectionHandler> + Send>;

/// External collaborators the server is assembled from.
pub struct ServerParts {
    pub engine: Arc<dyn GameEngine>,
    pub world: Box<dyn World>,
    pub remote: Arc<dyn RemoteStore>,
    pub connection_handler: HandlerFactory,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// A running server process: engine loop, attribute store and the game
/// client listener.
///
/// Startup never aborts. If the engine fails to start or the listener cannot
/// bind, the failure is logged and the server keeps running without them;
/// [`Server::is_initialized`] reports whether the engine came up.
pub struct Server {
    config: Arc<ServerConfig>,
    engine: Option<Arc<dyn GameEngine>>,
    lifecycle: LifecycleHandle,
    attributes: PlayerAttributeStore,
    stats: Arc<ServerStats>,
    listener_addr: Option<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
    engine_task: Option<JoinHandle<()>>,
}

impl Server {
    pub async fn start(config: ServerConfig, parts: ServerParts) -> Self {
        let ServerParts {
            engine,
            world,
            remote,
            connection_handler,
        } = parts;

        let attributes = PlayerAttributeStore::new(
            LocalAttributes::new(&config.players_dir),
            RemoteAttributes::new(remote),
        );
        attributes.reset_online();
        let stats = Arc::new(ServerStats::new());
        stats.reset_vars();

        let controller = LifecycleController::new(
            world,
            Arc::clone(&engine),
            LifecycleSettings::from(&config.lifecycle),
        );
        let (lifecycle, engine_task) =
            spawn_engine_loop(controller, config.engine.tick_interval());

        let mut server = Self {
            config: Arc::new(config),
            engine: None,
            lifecycle,
            attributes,
            stats,
            listener_addr: None,
            acceptor: None,
            engine_task: Some(engine_task),
        };

        match server.bring_up(engine, connection_handler).await {
            Ok(()) => tracing::info!(
                addr = ?server.listener_addr,
                "Server started"
            ),
            Err(e) => tracing::error!(error = %e, "Server startup failed, running degraded"),
        }
        server
    }

    async fn bring_up(
        &mut self,
        engine: Arc<dyn GameEngine>,
        factory: HandlerFactory,
    ) -> Result<(), StartupError> {
        engine.start()?;
        self.engine = Some(Arc::clone(&engine));

        let addr = self.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        self.listener_addr = listener.local_addr().ok();

        let handler = factory(engine);
        let stats = Arc::clone(&self.stats);
        self.acceptor = Some(tokio::spawn(accept_loop(listener, handler, stats)));
        Ok(())
    }

    /// Whether the engine started.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&Arc<dyn GameEngine>> {
        self.engine.as_ref()
    }

    /// False once the update shutdown has fired.
    pub fn running(&self) -> bool {
        self.lifecycle.running()
    }

    pub fn lifecycle(&self) -> &LifecycleHandle {
        &self.lifecycle
    }

    pub fn attributes(&self) -> &PlayerAttributeStore {
        &self.attributes
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Game client listener address, if it bound.
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener_addr
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting game client connections.
    pub fn unbind(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            tracing::info!("Game listener closed");
        }
        self.listener_addr = None;
    }

    /// Wait until the engine loop exits (after the update shutdown fires or
    /// a stop is requested).
    /// Cancel-safe: the task handle is kept until the loop has exited.
    pub async fn stopped(&mut self) {
        let Some(task) = self.engine_task.as_mut() else {
            return;
        };
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Engine loop task failed");
        }
        self.engine_task = None;
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn ConnectionHandler>,
    stats: Arc<ServerStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                }
                stats.record_connection();
                handler.on_connect(stream, peer);
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use kingdom_core::test_helpers::{MockEngine, MockWorld};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        peers: Mutex<Vec<SocketAddr>>,
    }

    impl ConnectionHandler for RecordingHandler {
        fn on_connect(&self, _stream: TcpStream, peer: SocketAddr) {
            self.peers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(peer);
        }
    }

    fn parts(engine: &MockEngine, handler: Arc<RecordingHandler>) -> ServerParts {
        ServerParts {
            engine: Arc::new(engine.clone()),
            world: Box::new(MockWorld::new()),
            remote: Arc::new(MemoryStore::new()),
            connection_handler: Box::new(move |_engine: Arc<dyn GameEngine>| {
                handler as Arc<dyn ConnectionHandler>
            }),
        }
    }

    fn config_in(dir: &std::path::Path) -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            players_dir: dir.to_string_lossy().into_owned(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_binds_and_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MockEngine::new();
        let handler = Arc::new(RecordingHandler::default());
        let mut server =
            Server::start(config_in(dir.path()), parts(&engine, Arc::clone(&handler))).await;

        assert!(server.is_initialized());
        assert!(server.running());
        assert_eq!(engine.start_calls(), 1);
        let addr = server.listener_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        for _ in 0..50 {
            if server.stats().connections() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(server.stats().connections(), 1);
        assert_eq!(handler.peers.lock().unwrap().len(), 1);

        server.unbind();
        assert!(server.listener_addr().is_none());
        server.lifecycle().stop();
        server.stopped().await;
    }

    #[tokio::test]
    async fn engine_failure_leaves_server_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MockEngine::failing();
        let handler = Arc::new(RecordingHandler::default());
        let mut server = Server::start(config_in(dir.path()), parts(&engine, handler)).await;

        assert!(!server.is_initialized());
        assert!(server.listener_addr().is_none());
        // The lifecycle layer still works without the engine.
        assert!(server.lifecycle().pvp_timer_start(30).await);

        server.lifecycle().stop();
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_failure_keeps_engine() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ServerConfig {
            listen_addr: taken.local_addr().unwrap().to_string(),
            ..config_in(dir.path())
        };
        let handler = Arc::new(RecordingHandler::default());
        let mut server = Server::start(config, parts(&MockEngine::new(), handler)).await;

        assert!(server.is_initialized());
        assert!(server.listener_addr().is_none());

        server.lifecycle().stop();
        server.stopped().await;
    }

    #[tokio::test]
    async fn start_resets_login_flags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bob.cfg"), "loggedin=true\n").unwrap();
        let handler = Arc::new(RecordingHandler::default());
        let mut server =
            Server::start(config_in(dir.path()), parts(&MockEngine::new(), handler)).await;

        assert_eq!(
            server.attributes().read_value("Bob", "loggedin").as_deref(),
            Some("false")
        );

        server.lifecycle().stop();
        server.stopped().await;
    }
}
