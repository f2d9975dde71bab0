// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway assembly and lifecycle.
//!
//! Everything the collaborators need is built here once and passed down —
//! no process-wide singletons. Startup order: store → listener → engine/
//! scheduler → state restore → monitor → WMS poller, so early-connecting
//! shuttles are never refused; shutdown reverses it by cancelling the
//! shared token and draining the spawned tasks.

use crate::dispatch::Dispatcher;
use crate::engine::StateEngine;
use crate::listener::ShuttleListener;
use crate::monitor::ShuttleMonitor;
use crate::registry::ConnectionRegistry;
use crate::scheduler::{CommandScheduler, SubmitError};
use crate::status::StatusEntry;
use crate::store::{self, FileStore, StateStore, StoreError};
use crate::wms::{HttpWmsClient, WmsError, WmsIntegration};
use crate::GatewayConfig;
use fs2::FileExt;
use sg_core::{Clock, CommandId, CommandKind, ShuttleCommand, ShuttleId};
use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Errors bringing the gateway up.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another gateway owns {path}: {source}")]
    LockFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind shuttle listener: {0}")]
    BindFailed(std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("WMS client setup failed: {0}")]
    Wms(#[from] WmsError),
}

/// The assembled gateway.
pub struct GatewayContext<C: Clock> {
    config: Arc<GatewayConfig>,
    registry: Arc<ConnectionRegistry>,
    engine: Arc<StateEngine<C>>,
    dispatcher: Arc<Dispatcher<C>>,
    scheduler: Arc<CommandScheduler<C>>,
    store: Arc<dyn StateStore>,
    token: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    listener_addr: SocketAddr,
    /// Held for the process lifetime; the lock releases when this drops.
    _lock_file: std::fs::File,
}

impl<C: Clock> std::fmt::Debug for GatewayContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("listener_addr", &self.listener_addr)
            .finish_non_exhaustive()
    }
}

impl<C: Clock> GatewayContext<C> {
    /// Bring the gateway up: lock the state directory, restore snapshots,
    /// bind the listener, spawn every background fiber.
    pub async fn start(config: GatewayConfig, clock: C) -> Result<Arc<Self>, LifecycleError> {
        let config = Arc::new(config);

        std::fs::create_dir_all(&config.state_dir)?;
        let lock_path = config.state_dir.join("sgd.lock");
        let mut lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|source| LifecycleError::LockFailed { path: lock_path, source })?;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        let store: Arc<dyn StateStore> = Arc::new(FileStore::open(&config.state_dir)?);

        // Restore is advisory: a broken snapshot starts the fleet UNKNOWN.
        let restored = match store.load_shuttle_states().await {
            Ok(states) => {
                if !states.is_empty() {
                    info!(count = states.len(), "restored shuttle states from store");
                }
                states
            }
            Err(e) => {
                warn!(error = %e, "could not restore shuttle states");
                Default::default()
            }
        };

        let token = CancellationToken::new();
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = Arc::new(StateEngine::new(
            config.shuttles.keys().cloned().collect::<Vec<_>>(),
            restored,
            Arc::clone(&registry),
            clock.clone(),
            config.write_timeout(),
        ));

        // Bind before anything can submit, so a shuttle dialing in during
        // startup lands on a live socket.
        let tcp = ShuttleListener::<C>::bind(&config).await.map_err(LifecycleError::BindFailed)?;
        let listener_addr = tcp.local_addr()?;

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&engine),
            Arc::clone(&config),
            clock.clone(),
            token.clone(),
        ));
        let scheduler = Arc::new(CommandScheduler::new(
            &config,
            Arc::clone(&dispatcher),
            Arc::clone(&engine),
            clock.clone(),
        ));

        let mut tasks = Vec::new();

        let listener = Arc::new(ShuttleListener::new(
            Arc::clone(&engine),
            Arc::clone(&registry),
            Arc::clone(&config),
            clock.clone(),
            token.clone(),
        ));
        tasks.push(tokio::spawn(listener.run(tcp)));

        tasks.extend(scheduler.spawn_workers(config.command_processor_workers, &token));

        let monitor = Arc::new(ShuttleMonitor::new(
            Arc::clone(&engine),
            Arc::clone(&scheduler),
            Arc::clone(&config),
            clock.clone(),
        ));
        tasks.push(tokio::spawn(monitor.run(token.clone())));

        tasks.push(store::spawn_snapshot_loop(
            Arc::clone(&store),
            Arc::clone(&engine),
            scheduler.command_registry(),
            token.clone(),
        ));
        tasks.push(store::spawn_backup_loop(
            config.state_dir.join("backups"),
            Arc::clone(&engine),
            token.clone(),
        ));

        if let Some(wms_config) = &config.wms {
            let client = Arc::new(HttpWmsClient::new(wms_config)?);
            let integration = Arc::new(WmsIntegration::new(
                client,
                Arc::clone(&dispatcher),
                Arc::clone(&scheduler),
                Arc::clone(&engine),
                Duration::from_secs(wms_config.poll_interval),
            ));
            tasks.push(tokio::spawn(integration.run(token.clone())));
            info!(interval_secs = wms_config.poll_interval, "WMS integration enabled");
        }

        info!(
            shuttles = config.shuttles.len(),
            workers = config.command_processor_workers,
            listener = %listener_addr,
            "gateway started"
        );

        Ok(Arc::new(Self {
            config,
            registry,
            engine,
            dispatcher,
            scheduler,
            store,
            token,
            tasks: parking_lot::Mutex::new(tasks),
            listener_addr,
            _lock_file: lock_file,
        }))
    }

    /// Cancel every fiber, take a final snapshot, close all links.
    pub async fn shutdown(&self) {
        info!("gateway shutting down");
        self.token.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "background task ended abnormally");
                }
            }
        }

        store::snapshot_once(self.store.as_ref(), &self.engine, &self.scheduler.command_registry())
            .await;
        self.registry.close_all().await;
        info!("gateway stopped");
    }

    // Dispatcher API surface.

    /// Submit a command for scheduling (or immediate fast-path dispatch).
    pub async fn submit(&self, command: ShuttleCommand) -> Result<CommandId, SubmitError> {
        self.scheduler.submit(command).await
    }

    /// Cancel a queued command.
    pub async fn cancel(&self, id: &CommandId) -> bool {
        self.scheduler.cancel(id).await
    }

    /// Pick a shuttle for a logical operation.
    pub fn find_free_shuttle(
        &self,
        stock_name: &str,
        cell_id: Option<&str>,
        kind: Option<CommandKind>,
        external_id: Option<&str>,
    ) -> Option<ShuttleId> {
        self.dispatcher.find_free_shuttle(stock_name, cell_id, kind, external_id)
    }

    /// Read-only view for the status surface.
    pub fn status_view(&self) -> BTreeMap<ShuttleId, StatusEntry> {
        self.engine.status_view()
    }

    pub fn engine(&self) -> &Arc<StateEngine<C>> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<CommandScheduler<C>> {
        &self.scheduler
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Where the listener actually bound (useful with port 0).
    pub fn listener_addr(&self) -> SocketAddr {
        self.listener_addr
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
