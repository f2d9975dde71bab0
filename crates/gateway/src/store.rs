// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory persistence: shuttle state and command registry snapshots.
//!
//! Keys follow the external contract — `shuttle_state:<id>` per shuttle
//! and `command_registry` for the registry — so a remote KV store can
//! implement [`StateStore`] without touching the callers. The shipped
//! [`FileStore`] keeps one JSON document per key with atomic writes and a
//! `.bak` of the previous registry document.
//!
//! Persistence is never load-bearing: every caller logs store errors and
//! moves on.

use crate::engine::StateEngine;
use async_trait::async_trait;
use sg_core::{Clock, CommandRegistry, ShuttleId, ShuttleState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Key prefix for per-shuttle state documents.
pub const SHUTTLE_STATE_KEY_PREFIX: &str = "shuttle_state:";

/// Key for the command registry document.
pub const COMMAND_REGISTRY_KEY: &str = "command_registry";

/// Snapshot cadence.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(10);

/// Backup cadence and retention.
const BACKUP_INTERVAL: Duration = Duration::from_secs(3_600);
const BACKUP_RETRY_DELAY: Duration = Duration::from_secs(60);
const BACKUPS_KEPT: usize = 10;

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The snapshot/restore contract with the external store.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save_shuttle_state(&self, state: &ShuttleState) -> Result<(), StoreError>;
    async fn load_shuttle_states(&self) -> Result<HashMap<ShuttleId, ShuttleState>, StoreError>;
    async fn save_command_registry(&self, registry: &CommandRegistry) -> Result<(), StoreError>;
    async fn load_command_registry(&self) -> Result<Option<CommandRegistry>, StoreError>;
}

/// File-backed store: one JSON document per key under the state directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating the directory if needed).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// `shuttle_state:s1` → `<root>/shuttle_state_s1.json`
    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key.replace(':', "_")))
    }

    /// Write via a temp file in the same directory, then rename.
    async fn write_atomic(&self, path: &Path, bytes: Vec<u8>) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStore {
    async fn save_shuttle_state(&self, state: &ShuttleState) -> Result<(), StoreError> {
        let key = format!("{SHUTTLE_STATE_KEY_PREFIX}{}", state.shuttle_id);
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_atomic(&self.key_path(&key), bytes).await
    }

    async fn load_shuttle_states(&self) -> Result<HashMap<ShuttleId, ShuttleState>, StoreError> {
        let mut states = HashMap::new();
        let file_prefix = SHUTTLE_STATE_KEY_PREFIX.replace(':', "_");
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(".json") else { continue };
            if !stem.starts_with(&file_prefix) {
                continue;
            }
            let bytes = tokio::fs::read(entry.path()).await?;
            match serde_json::from_slice::<ShuttleState>(&bytes) {
                Ok(state) => {
                    states.insert(state.shuttle_id.clone(), state);
                }
                Err(e) => {
                    warn!(file = name, error = %e, "skipping unreadable state document");
                }
            }
        }
        Ok(states)
    }

    async fn save_command_registry(&self, registry: &CommandRegistry) -> Result<(), StoreError> {
        let path = self.key_path(COMMAND_REGISTRY_KEY);
        // Keep the previous registry document around as .bak.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let _ = tokio::fs::rename(&path, path.with_extension("json.bak")).await;
        }
        let bytes = serde_json::to_vec_pretty(registry)?;
        self.write_atomic(&path, bytes).await
    }

    async fn load_command_registry(&self) -> Result<Option<CommandRegistry>, StoreError> {
        let path = self.key_path(COMMAND_REGISTRY_KEY);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Periodically snapshot every shuttle state and the command registry.
pub fn spawn_snapshot_loop<C: Clock>(
    store: Arc<dyn StateStore>,
    engine: Arc<StateEngine<C>>,
    registry: Arc<parking_lot::Mutex<CommandRegistry>>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(SNAPSHOT_INTERVAL) => {}
            }
            snapshot_once(store.as_ref(), &engine, &registry).await;
        }
        info!("snapshot loop stopped");
    })
}

/// One full snapshot pass. Errors are logged, never fatal.
pub async fn snapshot_once<C: Clock>(
    store: &dyn StateStore,
    engine: &StateEngine<C>,
    registry: &parking_lot::Mutex<CommandRegistry>,
) {
    for (shuttle, state) in engine.states() {
        let state = state.lock().clone();
        if let Err(e) = store.save_shuttle_state(&state).await {
            warn!(shuttle = %shuttle, error = %e, "failed to snapshot shuttle state");
        }
    }
    let registry = registry.lock().clone();
    if let Err(e) = store.save_command_registry(&registry).await {
        warn!(error = %e, "failed to snapshot command registry");
    }
}

/// Hourly JSON backup of all shuttle states, pruned to the newest
/// [`BACKUPS_KEPT`] files.
pub fn spawn_backup_loop<C: Clock>(
    backup_dir: PathBuf,
    engine: Arc<StateEngine<C>>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match backup_once(&backup_dir, &engine).await {
                Ok(path) => {
                    info!(path = %path.display(), "state backup written");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(BACKUP_INTERVAL) => {}
                    }
                }
                Err(e) => {
                    warn!(error = %e, "state backup failed");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(BACKUP_RETRY_DELAY) => {}
                    }
                }
            }
        }
        info!("backup loop stopped");
    })
}

async fn backup_once<C: Clock>(
    backup_dir: &Path,
    engine: &StateEngine<C>,
) -> Result<PathBuf, StoreError> {
    tokio::fs::create_dir_all(backup_dir).await?;

    let states: HashMap<ShuttleId, ShuttleState> = engine
        .states()
        .map(|(id, state)| (id.clone(), state.lock().clone()))
        .collect();

    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = backup_dir.join(format!("shuttle_states_{stamp}.json"));
    tokio::fs::write(&path, serde_json::to_vec_pretty(&states)?).await?;

    prune_backups(backup_dir).await?;
    Ok(path)
}

/// Delete the oldest backups past the retention limit. Timestamped names
/// sort chronologically, so a name sort is an age sort.
async fn prune_backups(backup_dir: &Path) -> Result<(), StoreError> {
    let mut backups = Vec::new();
    let mut entries = tokio::fs::read_dir(backup_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with("shuttle_states_") && name.ends_with(".json") {
            backups.push(entry.path());
        }
    }
    backups.sort();
    if backups.len() > BACKUPS_KEPT {
        let excess = backups.len() - BACKUPS_KEPT;
        for path in backups.into_iter().take(excess) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "failed to prune old backup");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
