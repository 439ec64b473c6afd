//! Per-player attribute persistence.
//!
//! Reads go to the local save files under the players directory; writes go
//! to the remote key-value store, and only update records that already exist
//! there. The two backends are independent: nothing copies a remote write
//! into the local file or the other way round, so `read_value` is not
//! expected to observe what `write_value` stored.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kingdom_core::properties::Properties;
use kingdom_core::username::normalize_username;

use crate::remote::{RemoteStore, StoreError};

/// Attribute reset to `false` for every save file at startup.
pub const LOGGED_IN_KEY: &str = "loggedin";

const SAVE_EXTENSION: &str = "cfg";
const LOCAL_HEADER: &str = "Character data";
const REMOTE_HEADER: &str = "Player save";

#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("no save file for {user}")]
    FileNotFound { user: String },
    #[error("attribute {key} is not set for {user}")]
    KeyNotFound { user: String, key: String },
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Remote record key for a player.
pub fn remote_key(user: &str) -> String {
    format!("player_{}", normalize_username(user))
}

/// Read path: one `<username>.cfg` file per player.
#[derive(Debug, Clone)]
pub struct LocalAttributes {
    dir: PathBuf,
}

impl LocalAttributes {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save file path for `user`. None when the normalized name has
    /// characters other than `[a-z0-9_]`, so no name can leave the
    /// players directory.
    pub fn path_for(&self, user: &str) -> Option<PathBuf> {
        let name = normalize_username(user);
        is_save_name(&name).then(|| self.dir.join(format!("{name}.{SAVE_EXTENSION}")))
    }

    /// Look up one attribute, distinguishing a missing file or key from an
    /// I/O failure.
    pub fn lookup_value(&self, user: &str, key: &str) -> Result<String, AttributeError> {
        let not_found = || AttributeError::FileNotFound {
            user: user.to_string(),
        };
        let path = self.path_for(user).ok_or_else(not_found)?;
        let bytes = std::fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                not_found()
            } else {
                AttributeError::Io { path, source }
            }
        })?;

        Properties::from_bytes(&bytes)
            .get(key)
            .map(str::to_string)
            .ok_or_else(|| AttributeError::KeyNotFound {
                user: user.to_string(),
                key: key.to_string(),
            })
    }

    /// Look up one attribute; every failure reads as absent.
    pub fn read_value(&self, user: &str, key: &str) -> Option<String> {
        match self.lookup_value(user, key) {
            Ok(value) => Some(value),
            Err(e @ AttributeError::Io { .. }) => {
                tracing::warn!(
                    user,
                    key,
                    error = %e,
                    "Unreadable save file, treating attribute as absent"
                );
                None
            },
            Err(_) => None,
        }
    }

    /// Force `loggedin=false` in every `.cfg` file of the players directory.
    /// Other files are left alone; a missing directory is not an error.
    /// Returns the number of files rewritten.
    pub fn reset_online(&self) -> usize {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(
                    dir = %self.dir.display(),
                    error = %e,
                    "No players directory to reset"
                );
                return 0;
            },
        };

        let mut count = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_save = path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == SAVE_EXTENSION);
            if !is_save {
                continue;
            }
            match reset_file(&path) {
                Ok(()) => count += 1,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to reset login flag"
                    );
                },
            }
        }
        tracing::info!(count, "Accounts reset to logged out");
        count
    }
}

fn is_save_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn reset_file(path: &Path) -> io::Result<()> {
    let mut props = Properties::from_bytes(&std::fs::read(path)?);
    props.set(LOGGED_IN_KEY, "false");
    std::fs::write(path, props.store(LOCAL_HEADER))
}

/// Result of a remote write that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Updated,
    /// No remote record exists for the player; nothing was written.
    MissingRecord,
}

/// Write path: update attributes on existing remote records.
#[derive(Clone)]
pub struct RemoteAttributes {
    store: Arc<dyn RemoteStore>,
}

impl RemoteAttributes {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Set `key = value` on the player's remote record if it exists.
    /// The connection is held for the duration of the call only.
    pub fn try_write_value(
        &self,
        user: &str,
        key: &str,
        value: &str,
    ) -> Result<WriteOutcome, StoreError> {
        let record_key = remote_key(user);
        let mut conn = self.store.connection()?;
        if !conn.exists(&record_key)? {
            return Ok(WriteOutcome::MissingRecord);
        }
        let Some(blob) = conn.get(&record_key)? else {
            return Ok(WriteOutcome::MissingRecord);
        };

        let mut props = Properties::parse(&blob);
        props.set(key, value);
        conn.set(&record_key, &props.store(REMOTE_HEADER))?;
        Ok(WriteOutcome::Updated)
    }

    /// Like [`Self::try_write_value`], but failures are logged and dropped.
    pub fn write_value(&self, user: &str, key: &str, value: &str) {
        match self.try_write_value(user, key, value) {
            Ok(WriteOutcome::Updated) => {
                tracing::debug!(user, key, "Remote attribute updated");
            },
            Ok(WriteOutcome::MissingRecord) => {
                tracing::debug!(user, key, "No remote record, attribute not written");
            },
            Err(e) => {
                tracing::warn!(user, key, error = %e, "Remote attribute write failed");
            },
        }
    }
}

/// Both attribute backends behind one handle.
#[derive(Clone)]
pub struct PlayerAttributeStore {
    local: LocalAttributes,
    remote: RemoteAttributes,
}

impl PlayerAttributeStore {
    pub fn new(local: LocalAttributes, remote: RemoteAttributes) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &LocalAttributes {
        &self.local
    }

    pub fn remote(&self) -> &RemoteAttributes {
        &self.remote
    }

    pub fn read_value(&self, user: &str, key: &str) -> Option<String> {
        self.local.read_value(user, key)
    }

    pub fn write_value(&self, user: &str, key: &str, value: &str) {
        self.remote.write_value(user, key, value);
    }

    pub fn reset_online(&self) -> usize {
        self.local.reset_online()
    }
}
