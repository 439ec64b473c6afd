//! Server lifecycle: the update shutdown countdown and the PvP tournament.
//!
//! Each timed phase lives in a named slot that holds at most one event.
//! Creating an event in an occupied slot is refused. The tournament runs
//! `Idle -> Waiting (pvp) -> Dueling (duel) -> Idle`; the pvp event's own
//! action moves it into `Dueling`, and only `stop_duel` ends it.
//!
//! All mutation happens on the engine thread that owns the controller.
//! Every change is published as a [`SlotSnapshot`] so other threads can read
//! the timers without touching the controller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::watch;

use kingdom_core::event::{Delay, DelayedEvent, EventHandler, NOT_SCHEDULED_MS, ScheduledEvent};
use kingdom_core::username::normalize_username;
use kingdom_core::world::{GameEngine, Point, World};

use crate::config::LifecycleConfig;

/// Queue of events whose actions run against the controller itself.
pub type LifecycleEvents = EventHandler<LifecycleController>;

/// Holder for at most one scheduled event.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Empty,
    Occupied(ScheduledEvent),
}

impl Slot {
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied(_))
    }

    pub fn event(&self) -> Option<&ScheduledEvent> {
        match self {
            Self::Empty => None,
            Self::Occupied(ev) => Some(ev),
        }
    }

    /// Whether the slot holds an event that is still pending.
    pub fn is_running(&self) -> bool {
        self.event().is_some_and(ScheduledEvent::is_running)
    }

    /// Milliseconds until the held event fires, or [`NOT_SCHEDULED_MS`].
    pub fn millis_remaining(&self) -> i64 {
        self.event()
            .map_or(NOT_SCHEDULED_MS, |ev| ev.millis_remaining_at(now()))
    }

    fn take(&mut self) -> Option<ScheduledEvent> {
        match std::mem::take(self) {
            Self::Empty => None,
            Self::Occupied(ev) => Some(ev),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentPhase {
    Idle,
    Waiting,
    Dueling,
}

/// The three lifecycle slots. Published after every change.
#[derive(Debug, Clone, Default)]
pub struct SlotSnapshot {
    pub update: Slot,
    pub pvp: Slot,
    pub duel: Slot,
}

impl SlotSnapshot {
    pub fn time_till_shutdown(&self) -> i64 {
        self.update.millis_remaining()
    }

    pub fn time_till_pvp(&self) -> i64 {
        self.pvp.millis_remaining()
    }

    pub fn time_till_duel(&self) -> i64 {
        self.duel.millis_remaining()
    }

    /// True while the dueling phase is active.
    pub fn pvp_is_running(&self) -> bool {
        self.duel.is_running()
    }

    /// True while the tournament is counting down to its start.
    pub fn waiting_is_running(&self) -> bool {
        self.pvp.is_running()
    }

    pub fn phase(&self) -> TournamentPhase {
        if self.duel.is_occupied() {
            TournamentPhase::Dueling
        } else if self.pvp.is_occupied() {
            TournamentPhase::Waiting
        } else {
            TournamentPhase::Idle
        }
    }
}

/// Tunables for the timed phases.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub shutdown_delay: Duration,
    pub arena: Point,
    pub start_message: String,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&LifecycleConfig::default())
    }
}

impl From<&LifecycleConfig> for LifecycleSettings {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            shutdown_delay: Duration::from_secs(config.shutdown_delay_secs),
            arena: config.arena.into(),
            start_message: config.start_message.clone(),
        }
    }
}

pub struct LifecycleController {
    events: LifecycleEvents,
    slots: SlotSnapshot,
    world: Box<dyn World>,
    engine: Arc<dyn GameEngine>,
    settings: LifecycleSettings,
    running: Arc<AtomicBool>,
    status_tx: watch::Sender<SlotSnapshot>,
}

impl LifecycleController {
    pub fn new(
        world: Box<dyn World>,
        engine: Arc<dyn GameEngine>,
        settings: LifecycleSettings,
    ) -> Self {
        let (status_tx, _) = watch::channel(SlotSnapshot::default());
        Self {
            events: LifecycleEvents::new(),
            slots: SlotSnapshot::default(),
            world,
            engine,
            settings,
            running: Arc::new(AtomicBool::new(true)),
            status_tx,
        }
    }

    /// Receiver that sees every published slot change.
    pub fn subscribe(&self) -> watch::Receiver<SlotSnapshot> {
        self.status_tx.subscribe()
    }

    /// Shared flag that turns false once the shutdown event has fired.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn slots(&self) -> &SlotSnapshot {
        &self.slots
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Number of events waiting in the queue.
    pub fn queued_events(&self) -> usize {
        self.events.len()
    }

    /// Fire every event due at `now`. Returns how many fired.
    pub fn tick(&mut self, now: Instant) -> usize {
        let due = self.events.take_due(now);
        if due.is_empty() {
            return 0;
        }
        let mut fired = 0;
        for event in due {
            if event.fire(self) {
                fired += 1;
            }
        }
        self.publish();
        fired
    }

    /// Schedule the server to stop after the configured delay. Returns false
    /// if a shutdown is already scheduled. There is no way to call it off.
    pub fn shutdown_for_update(&mut self) -> bool {
        self.shutdown_for_update_after(self.settings.shutdown_delay)
    }

    pub fn shutdown_for_update_after(&mut self, delay: Duration) -> bool {
        if self.slots.update.is_occupied() {
            tracing::info!("Shutdown already scheduled");
            return false;
        }
        let event = self.schedule("update", Delay::After(delay), |server: &mut Self| {
            server.kill();
        });
        self.slots.update = Slot::Occupied(event);
        self.publish();
        tracing::info!(delay_ms = delay.as_millis() as u64, "Server shutdown scheduled");
        true
    }

    /// Start the tournament countdown. When it fires, every player is told
    /// the tournament started, entrants waiting in the waiting room are
    /// moved to the arena, and the dueling phase begins.
    pub fn pvp_timer_start(&mut self, delay_secs: u64) -> bool {
        if self.slots.pvp.is_occupied() {
            tracing::info!("PvP countdown already running");
            return false;
        }
        let message = self.settings.start_message.clone();
        let arena = self.settings.arena;
        let event = self.schedule(
            "pvp",
            Delay::from_secs(delay_secs),
            move |server: &mut Self| server.start_tournament(&message, arena),
        );
        self.slots.pvp = Slot::Occupied(event);
        self.publish();
        tracing::info!(delay_secs, "PvP countdown started");
        true
    }

    /// Enter the dueling phase, ending any pvp countdown. The duel event
    /// never expires on its own; `stop_duel` ends it.
    pub fn dueling_event(&mut self) -> bool {
        if self.slots.duel.is_occupied() {
            tracing::info!("Dueling phase already active");
            return false;
        }
        self.stop_pvp();
        let event = self.schedule("duel", Delay::Indefinite, |_server: &mut Self| {
            tracing::error!("Dueling phase expired without being stopped");
        });
        self.slots.duel = Slot::Occupied(event);
        self.publish();
        tracing::info!("Dueling phase started");
        true
    }

    pub fn stop_pvp(&mut self) {
        if let Some(event) = self.slots.pvp.take() {
            event.cancel();
            self.publish();
            tracing::info!("PvP countdown cleared");
        }
    }

    /// End the dueling phase and announce the result to every player.
    pub fn stop_duel(&mut self) {
        if let Some(event) = self.slots.duel.take() {
            event.cancel();
            self.publish();
            tracing::info!("Dueling phase stopped");
        }

        let winner = self.world.winner().unwrap_or_else(|| {
            tracing::warn!("Tournament stopped without a winner");
            "nobody".to_string()
        });
        let message = format!(
            "The winner of the PvP tournament was: @red@{winner}@whi@, who won @gre@{}GP",
            self.world.jackpot()
        );
        for player in self.world.players() {
            self.world.send_message(player, &message);
        }
    }

    pub fn time_till_shutdown(&self) -> i64 {
        self.slots.time_till_shutdown()
    }

    pub fn time_till_pvp(&self) -> i64 {
        self.slots.time_till_pvp()
    }

    pub fn time_till_duel(&self) -> i64 {
        self.slots.time_till_duel()
    }

    pub fn pvp_is_running(&self) -> bool {
        self.slots.pvp_is_running()
    }

    pub fn waiting_is_running(&self) -> bool {
        self.slots.waiting_is_running()
    }

    pub fn phase(&self) -> TournamentPhase {
        self.slots.phase()
    }

    /// Whether a player with this username is connected.
    pub fn is_online(&self, user: &str) -> bool {
        self.world.find_player(&normalize_username(user)).is_some()
    }

    /// Stop the server: clear the running flag and empty the world.
    pub fn kill(&mut self) {
        tracing::info!("Shutting down...");
        self.running.store(false, Ordering::Release);
        self.engine.empty_world();
    }

    fn start_tournament(&mut self, message: &str, arena: Point) {
        let mut relocated = 0;
        for player in self.world.players() {
            self.world.send_message(player, message);
            if self.world.pvp_entry(player) && self.world.in_waiting_room(player) {
                self.world.teleport(player, arena);
                relocated += 1;
            }
        }
        tracing::info!(relocated, %arena, "PvP tournament started");
        self.dueling_event();
    }

    fn schedule(
        &mut self,
        label: &'static str,
        delay: Delay,
        action: impl FnOnce(&mut Self) + Send + 'static,
    ) -> ScheduledEvent {
        self.events
            .add(DelayedEvent::starting_at(label, now(), delay, action))
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.slots.clone());
    }
}

/// Current time on the runtime clock, so a paused test clock drives events.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
