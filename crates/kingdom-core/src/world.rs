//! Narrow interfaces to the simulation engine and world model.
//!
//! The lifecycle layer never reaches for global state; it receives these
//! collaborators at construction.

/// Unique identifier for a connected player.
pub type PlayerId = u64;

/// A tile coordinate in the game world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine failed to start: {0}")]
    Start(String),
}

/// The simulation engine that advances game state.
pub trait GameEngine: Send + Sync {
    /// Start the simulation.
    fn start(&self) -> Result<(), EngineError>;

    /// Release every entity in the world. Called once on shutdown.
    fn empty_world(&self);
}

/// The player/world entity model, as seen from the engine thread.
pub trait World: Send {
    /// Every currently connected player.
    fn players(&self) -> Vec<PlayerId>;

    /// Look up a connected player by normalized username.
    fn find_player(&self, username: &str) -> Option<PlayerId>;

    fn send_message(&mut self, player: PlayerId, message: &str);

    fn teleport(&mut self, player: PlayerId, to: Point);

    /// Whether the player signed up for the PvP tournament.
    fn pvp_entry(&self, player: PlayerId) -> bool;

    fn set_pvp_entry(&mut self, player: PlayerId, entered: bool);

    /// Whether the player currently stands in the tournament waiting room.
    fn in_waiting_room(&self, player: PlayerId) -> bool;

    /// Username of the last tournament winner, if there is one.
    fn winner(&self) -> Option<String>;

    /// Prize pot of the tournament, in coins.
    fn jackpot(&self) -> u64;
}
