use std::time::Duration;

use serde::Deserialize;

use kingdom_core::world::Point;

const CONFIG_FILE: &str = "kingdom.toml";

/// Top-level server configuration, loaded from `kingdom.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Game client listener.
    pub listen_addr: String,
    /// Admin HTTP API listener.
    pub admin_addr: String,
    /// Directory holding the per-player `.cfg` save files.
    pub players_dir: String,
    pub engine: EngineConfig,
    pub lifecycle: LifecycleConfig,
    pub remote: RemoteConfig,
    pub auth: AuthFileConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:43594".to_string(),
            admin_addr: "127.0.0.1:8080".to_string(),
            players_dir: "players".to_string(),
            engine: EngineConfig::default(),
            lifecycle: LifecycleConfig::default(),
            remote: RemoteConfig::default(),
            auth: AuthFileConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Never shorter than one millisecond, even when validation was skipped.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Timed phases: update shutdown and the PvP tournament.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub shutdown_delay_secs: u64,
    /// Where tournament entrants are sent from the waiting room.
    pub arena: ArenaConfig,
    pub start_message: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_delay_secs: 65,
            arena: ArenaConfig::default(),
            start_message: "The PvP tournament has started!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub x: i32,
    pub y: i32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self { x: 228, y: 130 }
    }
}

impl From<ArenaConfig> for Point {
    fn from(arena: ArenaConfig) -> Self {
        Point::new(arena.x, arena.y)
    }
}

/// Remote key-value store holding player records.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `redis://` URL. None = in-process store, nothing is persisted.
    pub url: Option<String>,
    pub pool_size: u32,
    /// How long a checkout waits for a connection before failing.
    pub connect_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 8,
            connect_timeout_ms: 2_000,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    /// Bearer token for the admin API. None = admin API is open.
    pub bearer_token: Option<String>,
}

impl ServerConfig {
    /// Check the configuration, replacing invalid values with defaults.
    /// Returns one message per problem; each is also logged.
    pub fn validate(&mut self) -> Vec<String> {
        let defaults = ServerConfig::default();
        let mut problems = Vec::new();

        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!(
                "listen_addr {:?} is not a valid socket address, using {}",
                self.listen_addr, defaults.listen_addr
            ));
            self.listen_addr = defaults.listen_addr;
        }
        if self.admin_addr.parse::<std::net::SocketAddr>().is_err() {
            problems.push(format!(
                "admin_addr {:?} is not a valid socket address, using {}",
                self.admin_addr, defaults.admin_addr
            ));
            self.admin_addr = defaults.admin_addr;
        }
        if self.players_dir.is_empty() {
            problems.push(format!(
                "players_dir is empty, using {}",
                defaults.players_dir
            ));
            self.players_dir = defaults.players_dir;
        }
        if self.engine.tick_interval_ms == 0 {
            problems.push(format!(
                "engine.tick_interval_ms must be > 0, using {}",
                defaults.engine.tick_interval_ms
            ));
            self.engine.tick_interval_ms = defaults.engine.tick_interval_ms;
        }
        if self.remote.pool_size == 0 {
            problems.push(format!(
                "remote.pool_size must be > 0, using {}",
                defaults.remote.pool_size
            ));
            self.remote.pool_size = defaults.remote.pool_size;
        }
        if self.remote.connect_timeout_ms == 0 {
            problems.push(format!(
                "remote.connect_timeout_ms must be > 0, using {}",
                defaults.remote.connect_timeout_ms
            ));
            self.remote.connect_timeout_ms = defaults.remote.connect_timeout_ms;
        }

        // Warn about secrets in config file (should use env vars in production)
        if self.auth.bearer_token.is_some() {
            tracing::warn!(
                "bearer_token is set in config file, use KINGDOM_API_TOKEN env var in production"
            );
        }

        for problem in &problems {
            tracing::error!("{problem}");
        }
        problems
    }

    /// Load config from `kingdom.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from {CONFIG_FILE}");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse {CONFIG_FILE}: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No {CONFIG_FILE} found, using defaults");
                ServerConfig::default()
            },
        };

        // Environment variable overrides
        if let Ok(addr) = std::env::var("KINGDOM_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(addr) = std::env::var("KINGDOM_ADMIN_ADDR")
            && !addr.is_empty()
        {
            config.admin_addr = addr;
        }
        if let Ok(dir) = std::env::var("KINGDOM_PLAYERS_DIR")
            && !dir.is_empty()
        {
            config.players_dir = dir;
        }
        if let Ok(token) = std::env::var("KINGDOM_API_TOKEN")
            && !token.is_empty()
        {
            config.auth.bearer_token = Some(token);
        }
        if let Ok(url) = std::env::var("KINGDOM_REMOTE_URL")
            && !url.is_empty()
        {
            config.remote.url = Some(url);
        }
        if let Ok(val) = std::env::var("KINGDOM_TICK_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.engine.tick_interval_ms = n;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:43594");
        assert_eq!(cfg.players_dir, "players");
        assert_eq!(cfg.engine.tick_interval(), Duration::from_millis(50));
        assert_eq!(cfg.lifecycle.shutdown_delay_secs, 65);
        assert_eq!(Point::from(cfg.lifecycle.arena), Point::new(228, 130));
        assert!(cfg.auth.bearer_token.is_none());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"
players_dir = "/srv/players"

[auth]
bearer_token = "secret123"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.players_dir, "/srv/players");
        assert_eq!(cfg.auth.bearer_token.as_deref(), Some("secret123"));
        assert_eq!(cfg.lifecycle.shutdown_delay_secs, 65);
    }

    #[test]
    fn parse_lifecycle_toml() {
        let toml_str = r#"
[engine]
tick_interval_ms = 600

[lifecycle]
shutdown_delay_secs = 120
start_message = "Fight!"

[lifecycle.arena]
x = 10
y = 20
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.engine.tick_interval_ms, 600);
        assert_eq!(cfg.lifecycle.shutdown_delay_secs, 120);
        assert_eq!(cfg.lifecycle.start_message, "Fight!");
        assert_eq!(Point::from(cfg.lifecycle.arena), Point::new(10, 20));
    }

    #[test]
    fn parse_remote_toml() {
        let toml_str = r#"
[remote]
url = "redis://cache.internal:6379/2"
pool_size = 4
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.remote.url.as_deref(), Some("redis://cache.internal:6379/2"));
        assert_eq!(cfg.remote.pool_size, 4);
        assert_eq!(cfg.remote.connect_timeout(), Duration::from_secs(2));
        assert!(ServerConfig::default().remote.url.is_none());
    }

    #[test]
    fn validate_accepts_default_config() {
        let mut cfg = ServerConfig::default();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_replaces_invalid_values() {
        let mut cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            players_dir: String::new(),
            engine: EngineConfig {
                tick_interval_ms: 0,
            },
            remote: RemoteConfig {
                pool_size: 0,
                ..RemoteConfig::default()
            },
            ..ServerConfig::default()
        };
        let problems = cfg.validate();
        assert_eq!(problems.len(), 4);
        assert_eq!(cfg.remote.pool_size, 8);
        assert_eq!(cfg.listen_addr, "0.0.0.0:43594");
        assert_eq!(cfg.players_dir, "players");
        assert_eq!(cfg.engine.tick_interval_ms, 50);
    }

    #[test]
    fn zero_tick_interval_is_clamped() {
        let engine = EngineConfig {
            tick_interval_ms: 0,
        };
        assert_eq!(engine.tick_interval(), Duration::from_millis(1));
    }
}
