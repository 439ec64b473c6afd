pub mod event;
pub mod properties;
pub mod time;
pub mod username;
pub mod world;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    use crate::world::{EngineError, GameEngine, PlayerId, Point, World};

    /// A player as tracked by [`MockWorld`].
    #[derive(Debug, Clone)]
    pub struct MockPlayer {
        pub id: PlayerId,
        pub username: String,
        pub pvp_entry: bool,
        pub in_waiting_room: bool,
    }

    #[derive(Debug, Default)]
    pub struct MockWorldState {
        pub players: Vec<MockPlayer>,
        pub messages: Vec<(PlayerId, String)>,
        pub teleports: Vec<(PlayerId, Point)>,
        pub winner: Option<String>,
        pub jackpot: u64,
    }

    /// Recording [`World`]. Clones share state, so a test can keep one clone
    /// and hand the other to the code under test.
    #[derive(Debug, Clone, Default)]
    pub struct MockWorld {
        state: Arc<Mutex<MockWorldState>>,
    }

    impl MockWorld {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add `n` players named `player1..playerN` with sequential IDs.
        pub fn with_players(n: usize) -> Self {
            let world = Self::new();
            for i in 0..n {
                world.add_player(i as PlayerId + 1, &format!("player{}", i + 1));
            }
            world
        }

        pub fn add_player(&self, id: PlayerId, username: &str) {
            self.lock().players.push(MockPlayer {
                id,
                username: username.to_string(),
                pvp_entry: false,
                in_waiting_room: false,
            });
        }

        pub fn place_in_waiting_room(&self, id: PlayerId, inside: bool) {
            if let Some(p) = self.lock().players.iter_mut().find(|p| p.id == id) {
                p.in_waiting_room = inside;
            }
        }

        pub fn set_result(&self, winner: Option<&str>, jackpot: u64) {
            let mut state = self.lock();
            state.winner = winner.map(str::to_string);
            state.jackpot = jackpot;
        }

        pub fn messages(&self) -> Vec<(PlayerId, String)> {
            self.lock().messages.clone()
        }

        pub fn messages_for(&self, id: PlayerId) -> Vec<String> {
            self.lock()
                .messages
                .iter()
                .filter(|(p, _)| *p == id)
                .map(|(_, m)| m.clone())
                .collect()
        }

        pub fn teleports(&self) -> Vec<(PlayerId, Point)> {
            self.lock().teleports.clone()
        }

        fn lock(&self) -> MutexGuard<'_, MockWorldState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl World for MockWorld {
        fn players(&self) -> Vec<PlayerId> {
            self.lock().players.iter().map(|p| p.id).collect()
        }

        fn find_player(&self, username: &str) -> Option<PlayerId> {
            self.lock()
                .players
                .iter()
                .find(|p| p.username == username)
                .map(|p| p.id)
        }

        fn send_message(&mut self, player: PlayerId, message: &str) {
            self.lock().messages.push((player, message.to_string()));
        }

        fn teleport(&mut self, player: PlayerId, to: Point) {
            self.lock().teleports.push((player, to));
        }

        fn pvp_entry(&self, player: PlayerId) -> bool {
            self.lock()
                .players
                .iter()
                .any(|p| p.id == player && p.pvp_entry)
        }

        fn set_pvp_entry(&mut self, player: PlayerId, entered: bool) {
            if let Some(p) = self.lock().players.iter_mut().find(|p| p.id == player) {
                p.pvp_entry = entered;
            }
        }

        fn in_waiting_room(&self, player: PlayerId) -> bool {
            self.lock()
                .players
                .iter()
                .any(|p| p.id == player && p.in_waiting_room)
        }

        fn winner(&self) -> Option<String> {
            self.lock().winner.clone()
        }

        fn jackpot(&self) -> u64 {
            self.lock().jackpot
        }
    }

    /// Counting [`GameEngine`] that can be told to fail on start.
    #[derive(Debug, Clone, Default)]
    pub struct MockEngine {
        fail_start: Arc<AtomicBool>,
        started: Arc<AtomicUsize>,
        emptied: Arc<AtomicUsize>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            let engine = Self::default();
            engine.fail_start.store(true, Ordering::SeqCst);
            engine
        }

        pub fn start_calls(&self) -> usize {
            self.started.load(Ordering::SeqCst)
        }

        pub fn empty_world_calls(&self) -> usize {
            self.emptied.load(Ordering::SeqCst)
        }
    }

    impl GameEngine for MockEngine {
        fn start(&self) -> Result<(), EngineError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(EngineError::Start("mock engine refused to start".to_string()));
            }
            Ok(())
        }

        fn empty_world(&self) {
            self.emptied.fetch_add(1, Ordering::SeqCst);
        }
    }
}
