// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound shuttle listener.
//!
//! Shuttles dial the gateway on a well-known port; identity is the source
//! IP. Each accepted connection installs its write half in the registry
//! (so acks and outbound commands reuse the link) and runs a reader loop
//! that feeds the state engine line by line.

use crate::engine::StateEngine;
use crate::registry::ConnectionRegistry;
use crate::GatewayConfig;
use sg_core::{Clock, ShuttleId};
use sg_wire::{read_line, FrameError, PING_LINE};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Accept loop for inbound shuttle links.
pub struct ShuttleListener<C: Clock> {
    engine: Arc<StateEngine<C>>,
    registry: Arc<ConnectionRegistry>,
    config: Arc<GatewayConfig>,
    clock: C,
    token: CancellationToken,
}

impl<C: Clock> ShuttleListener<C> {
    pub fn new(
        engine: Arc<StateEngine<C>>,
        registry: Arc<ConnectionRegistry>,
        config: Arc<GatewayConfig>,
        clock: C,
        token: CancellationToken,
    ) -> Self {
        Self { engine, registry, config, clock, token }
    }

    /// Bind the configured listener port. Port 0 picks an ephemeral port;
    /// the bound address is on the returned listener.
    pub async fn bind(config: &GatewayConfig) -> std::io::Result<TcpListener> {
        let listener = TcpListener::bind(("0.0.0.0", config.shuttle_listener_port)).await?;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening for shuttles");
        }
        Ok(listener)
    }

    /// Run the accept loop until cancellation, spawning a reader per link.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!(%addr, "shuttle connected");
                        let this = Arc::clone(&self);
                        tokio::spawn(async move {
                            this.handle_connection(stream, addr.ip()).await;
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                }
            }
        }
        info!("shuttle listener stopped");
    }

    async fn handle_connection(&self, stream: TcpStream, peer_ip: IpAddr) {
        let shuttle = resolve_shuttle_id(&self.config, peer_ip);
        if !self.engine.is_known(&shuttle) {
            warn!(ip = %peer_ip, shuttle = %shuttle, "connection from unconfigured shuttle");
        }

        let (read_half, write_half) = stream.into_split();
        self.registry.register(&shuttle, write_half, true, self.clock.epoch_ms()).await;

        let read_timeout = self.config.read_timeout();
        let write_timeout = self.config.write_timeout();
        let mut reader = BufReader::new(read_half);

        loop {
            let line = tokio::select! {
                _ = self.token.cancelled() => break,
                result = read_line(&mut reader, read_timeout) => result,
            };
            match line {
                Ok(line) => self.engine.handle_line(&shuttle, &line).await,
                Err(FrameError::Timeout) => {
                    // Silent link: probe it. A failed probe means it is gone.
                    if let Err(e) = self.registry.send_line(&shuttle, PING_LINE, write_timeout).await
                    {
                        warn!(shuttle = %shuttle, error = %e, "link lost");
                        break;
                    }
                }
                Err(FrameError::Eof) => {
                    info!(shuttle = %shuttle, "shuttle disconnected");
                    break;
                }
                Err(e) => {
                    error!(shuttle = %shuttle, error = %e, "read error");
                    break;
                }
            }
        }

        self.registry.close(&shuttle).await;
    }
}

/// Map a source IP onto a shuttle identity.
///
/// Exact host match first; loopback peers fall back to any configured
/// loopback shuttle, then to any simulator shuttle. Unknown peers get a
/// minted temp identity that is acknowledged but never tracked.
fn resolve_shuttle_id(config: &GatewayConfig, ip: IpAddr) -> ShuttleId {
    let ip_text = ip.to_string();

    for (id, endpoint) in &config.shuttles {
        if endpoint.host == ip_text {
            return id.clone();
        }
    }

    if ip.is_loopback() {
        for (id, endpoint) in &config.shuttles {
            if endpoint.host == "127.0.0.1" || endpoint.host == "localhost" || endpoint.host == "::1"
            {
                return id.clone();
            }
        }
        if let Some(id) = config.shuttles.keys().find(|id| id.is_virtual()) {
            return id.clone();
        }
    }

    warn!(ip = %ip, "no shuttle configured for this address");
    ShuttleId::temp_for_ip(ip)
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
