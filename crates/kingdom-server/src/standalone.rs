//! Collaborators for running the lifecycle layer without a simulation
//! attached: an engine with nothing to simulate, a world with nobody in it,
//! and a listener that logs and closes every connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use kingdom_core::world::{EngineError, GameEngine, PlayerId, Point, World};

use crate::config::RemoteConfig;
use crate::remote;
use crate::server::{ConnectionHandler, ServerParts};

pub struct HeadlessEngine;

impl GameEngine for HeadlessEngine {
    fn start(&self) -> Result<(), EngineError> {
        tracing::info!("Headless engine started");
        Ok(())
    }

    fn empty_world(&self) {
        tracing::info!("Headless engine has no entities to release");
    }
}

pub struct EmptyWorld;

impl World for EmptyWorld {
    fn players(&self) -> Vec<PlayerId> {
        Vec::new()
    }

    fn find_player(&self, _username: &str) -> Option<PlayerId> {
        None
    }

    fn send_message(&mut self, _player: PlayerId, _message: &str) {}

    fn teleport(&mut self, _player: PlayerId, _to: Point) {}

    fn pvp_entry(&self, _player: PlayerId) -> bool {
        false
    }

    fn set_pvp_entry(&mut self, _player: PlayerId, _entered: bool) {}

    fn in_waiting_room(&self, _player: PlayerId) -> bool {
        false
    }

    fn winner(&self) -> Option<String> {
        None
    }

    fn jackpot(&self) -> u64 {
        0
    }
}

pub struct RejectingHandler;

impl ConnectionHandler for RejectingHandler {
    fn on_connect(&self, stream: TcpStream, peer: SocketAddr) {
        tracing::info!(%peer, "No game protocol attached, closing connection");
        drop(stream);
    }
}

/// Parts for a server with no simulation, using the remote store `remote`
/// selects.
pub fn headless_parts(remote: &RemoteConfig) -> ServerParts {
    ServerParts {
        engine: Arc::new(HeadlessEngine),
        world: Box::new(EmptyWorld),
        remote: remote::open_store(remote),
        connection_handler: Box::new(|_engine: Arc<dyn GameEngine>| {
            Arc::new(RejectingHandler) as Arc<dyn ConnectionHandler>
        }),
    }
}
