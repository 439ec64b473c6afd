use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters, shared between the listener, the game protocol and
/// the admin API.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections: AtomicU64,
    online_players: AtomicU64,
    online_mods: AtomicU64,
    online_admins: AtomicU64,
    peak_players: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub online_players: u64,
    pub online_mods: u64,
    pub online_admins: u64,
    pub peak_players: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter. Run once at startup, before any client connects.
    pub fn reset_vars(&self) {
        for counter in [
            &self.connections,
            &self.online_players,
            &self.online_mods,
            &self.online_admins,
            &self.peak_players,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// A player finished logging in. Moderators and admins are also players.
    pub fn player_joined(&self, is_mod: bool, is_admin: bool) {
        let online = self.online_players.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_players.fetch_max(online, Ordering::Relaxed);
        if is_mod {
            self.online_mods.fetch_add(1, Ordering::Relaxed);
        }
        if is_admin {
            self.online_admins.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn player_left(&self, is_mod: bool, is_admin: bool) {
        decrement(&self.online_players);
        if is_mod {
            decrement(&self.online_mods);
        }
        if is_admin {
            decrement(&self.online_admins);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            online_players: self.online_players.load(Ordering::Relaxed),
            online_mods: self.online_mods.load(Ordering::Relaxed),
            online_admins: self.online_admins.load(Ordering::Relaxed),
            peak_players: self.peak_players.load(Ordering::Relaxed),
        }
    }
}

// Saturates at zero; a leave without a matching join is ignored.
fn decrement(counter: &AtomicU64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
}
