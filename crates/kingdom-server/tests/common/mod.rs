use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kingdom_core::test_helpers::{MockEngine, MockWorld};

use kingdom_server::attributes::{LocalAttributes, PlayerAttributeStore, RemoteAttributes};
use kingdom_server::auth::AuthConfig;
use kingdom_server::build_app;
use kingdom_server::engine_loop::{LifecycleHandle, spawn_engine_loop};
use kingdom_server::lifecycle::{LifecycleController, LifecycleSettings};
use kingdom_server::remote::{MemoryStore, RemoteStore};
use kingdom_server::state::AppState;

pub const TICK: Duration = Duration::from_millis(10);

/// Admin API backed by recording collaborators, a temp players directory and
/// an in-memory remote store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub world: MockWorld,
    pub engine: MockEngine,
    pub remote: Arc<MemoryStore>,
    pub lifecycle: LifecycleHandle,
    players_dir: tempfile::TempDir,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::build(MockWorld::new(), LifecycleSettings::default(), None).await
    }

    /// Start a test server requiring the given bearer token.
    pub async fn with_auth(token: &str) -> Self {
        Self::build(
            MockWorld::new(),
            LifecycleSettings::default(),
            Some(token.to_string()),
        )
        .await
    }

    /// Start a test server over a prepared world and lifecycle settings.
    pub async fn with_world(world: MockWorld, settings: LifecycleSettings) -> Self {
        Self::build(world, settings, None).await
    }

    async fn build(
        world: MockWorld,
        settings: LifecycleSettings,
        bearer_token: Option<String>,
    ) -> Self {
        let players_dir = tempfile::tempdir().unwrap();
        let engine = MockEngine::new();
        let remote = Arc::new(MemoryStore::new());
        let attributes = PlayerAttributeStore::new(
            LocalAttributes::new(players_dir.path()),
            RemoteAttributes::new(Arc::clone(&remote) as Arc<dyn RemoteStore>),
        );

        let controller =
            LifecycleController::new(Box::new(world.clone()), Arc::new(engine.clone()), settings);
        let (lifecycle, _engine_task) = spawn_engine_loop(controller, TICK);

        let auth = AuthConfig { bearer_token };
        let state = AppState::new(lifecycle.clone(), attributes, auth, true);
        let app = build_app(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            world,
            engine,
            remote,
            lifecycle,
            players_dir,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("http://{}/api/v1{path}", self.addr)
    }

    pub fn players_dir(&self) -> &Path {
        self.players_dir.path()
    }

    /// Write a local save file for `user`.
    pub fn write_save(&self, user: &str, contents: &str) {
        let local = LocalAttributes::new(self.players_dir());
        std::fs::write(local.path_for(user).unwrap(), contents).unwrap();
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
