// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound write path and shuttle selection.
//!
//! `dispatch` is the single funnel every command goes through: ensure a
//! link (dialing and installing an outbound reader when needed), encode,
//! write under the write timeout, and fold the outcome into the shuttle's
//! state record. Callers serialize per shuttle via the scheduler's lock.

use crate::engine::StateEngine;
use crate::registry::{ConnectionError, ConnectionRegistry};
use crate::GatewayConfig;
use sg_core::{Clock, CommandKind, ShuttleCommand, ShuttleId, ShuttleStatus};
use sg_wire::{encode_command, read_line, FrameError};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outbound links are torn down after this much read silence.
const NO_RESPONSE_TIMEOUT_MS: u64 = 30_000;

/// Errors from dispatching a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("shuttle {0} is not configured")]
    UnknownShuttle(ShuttleId),

    #[error("connect failed: {0}")]
    Connect(#[source] ConnectionError),

    #[error("send failed: {0}")]
    Send(#[source] ConnectionError),
}

/// The outbound side of the control plane.
pub struct Dispatcher<C: Clock> {
    registry: Arc<ConnectionRegistry>,
    engine: Arc<StateEngine<C>>,
    config: Arc<GatewayConfig>,
    clock: C,
    token: CancellationToken,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        engine: Arc<StateEngine<C>>,
        config: Arc<GatewayConfig>,
        clock: C,
        token: CancellationToken,
    ) -> Self {
        Self { registry, engine, config, clock, token }
    }

    /// Write one command to its shuttle.
    ///
    /// On success the state records the send (BUSY unless MRCD, WMS context
    /// stamped). On failure the state goes to ERROR with a transport code
    /// and the link is torn down so the next dispatch redials.
    pub async fn dispatch(&self, command: &ShuttleCommand) -> Result<(), DispatchError> {
        let shuttle = &command.shuttle;
        self.ensure_connected(shuttle).await?;

        let line = encode_command(command);
        match self.registry.send_line(shuttle, &line, self.config.write_timeout()).await {
            Ok(()) => {
                info!(shuttle = %shuttle, command = %line, "command sent");
                if let Some(state) = self.engine.state(shuttle) {
                    state.lock().record_sent_command(command, &line, self.clock.epoch_ms());
                }
                Ok(())
            }
            Err(e) => {
                let code = match &e {
                    ConnectionError::SendTimeout => "SEND_TIMEOUT".to_string(),
                    other => format!("SEND_ERROR: {other}"),
                };
                warn!(shuttle = %shuttle, command = %line, error = %e, "send failed");
                if let Some(state) = self.engine.state(shuttle) {
                    let mut state = state.lock();
                    state.status = ShuttleStatus::Error;
                    state.error_code = Some(code);
                }
                self.registry.close(shuttle).await;
                Err(DispatchError::Send(e))
            }
        }
    }

    /// Ensure a link exists, dialing the command port when absent.
    async fn ensure_connected(&self, shuttle: &ShuttleId) -> Result<(), DispatchError> {
        let endpoint = self
            .config
            .shuttles
            .get(shuttle)
            .ok_or_else(|| DispatchError::UnknownShuttle(shuttle.clone()))?;

        let acquired = self
            .registry
            .acquire(
                shuttle,
                &endpoint.host,
                endpoint.command_port,
                self.config.connect_timeout(),
                self.clock.epoch_ms(),
            )
            .await;

        match acquired {
            Ok(None) => Ok(()),
            Ok(Some(read_half)) => {
                self.spawn_outbound_reader(shuttle.clone(), read_half);
                Ok(())
            }
            Err(e) => {
                let code = match &e {
                    ConnectionError::ConnectTimeout => "CONNECTION_TIMEOUT".to_string(),
                    ConnectionError::ConnectRefused => "CONNECTION_REFUSED".to_string(),
                    other => format!("CONNECTION_ERROR: {other}"),
                };
                warn!(shuttle = %shuttle, error = %e, "connect failed");
                if let Some(state) = self.engine.state(shuttle) {
                    let mut state = state.lock();
                    state.status = ShuttleStatus::Error;
                    state.error_code = Some(code);
                }
                Err(DispatchError::Connect(e))
            }
        }
    }

    /// Reader loop for a dialed link. Feeds the engine like a listener
    /// reader would, and tears the link down after 30 s of silence.
    fn spawn_outbound_reader(&self, shuttle: ShuttleId, read_half: OwnedReadHalf) {
        let engine = Arc::clone(&self.engine);
        let registry = Arc::clone(&self.registry);
        let clock = self.clock.clone();
        let token = self.token.clone();
        let read_timeout = self.config.read_timeout();

        tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                let line = tokio::select! {
                    _ = token.cancelled() => break,
                    result = read_line(&mut reader, read_timeout) => result,
                };
                match line {
                    Ok(line) => engine.handle_line(&shuttle, &line).await,
                    Err(FrameError::Timeout) => {
                        let silent_ms = engine
                            .state(&shuttle)
                            .map(|s| clock.epoch_ms().saturating_sub(s.lock().last_seen_ms))
                            .unwrap_or(u64::MAX);
                        if silent_ms > NO_RESPONSE_TIMEOUT_MS {
                            warn!(shuttle = %shuttle, silent_ms, "shuttle silent, dropping link");
                            if let Some(state) = engine.state(&shuttle) {
                                state.lock().mark_error("NO_RESPONSE_TIMEOUT");
                            }
                            registry.close(&shuttle).await;
                            break;
                        }
                    }
                    Err(FrameError::Eof) => {
                        info!(shuttle = %shuttle, "shuttle closed the link");
                        registry.close(&shuttle).await;
                        break;
                    }
                    Err(e) => {
                        warn!(shuttle = %shuttle, error = %e, "read error on shuttle link");
                        registry.close(&shuttle).await;
                        break;
                    }
                }
            }
        });
    }

    /// Pick a shuttle for a logical operation.
    ///
    /// HOME with an external ID returns the shuttle already carrying that
    /// work item. Otherwise candidates come from the stock mapping in
    /// preference order: high-priority kinds (HOME, STATUS, MRCD) take the
    /// first known candidate regardless of status, everything else takes
    /// the first FREE one.
    pub fn find_free_shuttle(
        &self,
        stock_name: &str,
        _cell_id: Option<&str>,
        kind: Option<CommandKind>,
        external_id: Option<&str>,
    ) -> Option<ShuttleId> {
        if kind == Some(CommandKind::Home) {
            if let Some(external_id) = external_id {
                let found = self.engine.states().find_map(|(id, state)| {
                    (state.lock().external_id.as_deref() == Some(external_id)).then(|| id.clone())
                });
                if found.is_none() {
                    warn!(external_id, "no shuttle carries this work item");
                }
                return found;
            }
        }

        let candidates = self.config.stock_to_shuttle.get(stock_name)?;
        let high_priority = matches!(
            kind,
            Some(CommandKind::Home) | Some(CommandKind::Status) | Some(CommandKind::Mrcd)
        );

        for shuttle in candidates {
            if !self.engine.is_known(shuttle) {
                continue;
            }
            if high_priority {
                return Some(shuttle.clone());
            }
            if self.engine.status_of(shuttle) == ShuttleStatus::Free {
                return Some(shuttle.clone());
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
