// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: one logical duplex link per shuttle.
//!
//! Links arrive two ways — the listener registers inbound connections, and
//! the dispatcher dials outbound when no link exists. The registry
//! deduplicates concurrent dials: the `connecting` set admits one dialer
//! per shuttle, everyone else waits for the winner's result.

use sg_core::ShuttleId;
use sg_wire::FrameError;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

/// Errors from connection handling.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("timed out connecting to shuttle")]
    ConnectTimeout,

    #[error("connection refused by shuttle")]
    ConnectRefused,

    #[error("shuttle is not connected")]
    NotConnected,

    #[error("send timed out")]
    SendTimeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct Link {
    /// Write half, individually locked so sends on different shuttles
    /// never serialize against each other.
    writer: Arc<Mutex<OwnedWriteHalf>>,
    established_at_ms: u64,
    inbound: bool,
}

#[derive(Default)]
struct Inner {
    links: HashMap<ShuttleId, Link>,
    connecting: HashSet<ShuttleId>,
}

/// Registry of live shuttle links.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    /// Signalled by a winning dialer once its attempt resolves, waking
    /// `acquire` waiters to re-check the link map.
    dial_done: Notify,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a link to `shuttle`, dialing `host:port` when none exists.
    ///
    /// Returns `Ok(None)` when a link was already registered, or
    /// `Ok(Some(read_half))` after a fresh dial — the caller owns the read
    /// half and is expected to spawn a reader loop for it. At most one dial
    /// per shuttle is in flight; concurrent callers wait and observe the
    /// winner's link. On failure nothing remains registered for the id.
    pub async fn acquire(
        &self,
        shuttle: &ShuttleId,
        host: &str,
        port: u16,
        timeout: Duration,
        now_ms: u64,
    ) -> Result<Option<OwnedReadHalf>, ConnectionError> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if inner.links.contains_key(shuttle) {
                    debug!(shuttle = %shuttle, "reusing existing link");
                    return Ok(None);
                }
                if !inner.connecting.contains(shuttle) {
                    inner.connecting.insert(shuttle.clone());
                    break;
                }
            }
            // Another caller owns the dial. Register for its completion
            // signal, then re-check: the dial may have resolved between
            // dropping the lock and enabling the waiter.
            let notified = self.dial_done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let inner = self.inner.lock().await;
                if !inner.connecting.contains(shuttle) {
                    continue;
                }
            }
            notified.await;
        }

        info!(shuttle = %shuttle, host, port, "dialing shuttle");
        let dialed = tokio::time::timeout(timeout, TcpStream::connect((host, port))).await;

        let mut inner = self.inner.lock().await;
        inner.connecting.remove(shuttle);
        self.dial_done.notify_waiters();

        match dialed {
            Err(_) => Err(ConnectionError::ConnectTimeout),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                Err(ConnectionError::ConnectRefused)
            }
            Ok(Err(e)) => Err(ConnectionError::Io(e)),
            Ok(Ok(stream)) => {
                let (read_half, write_half) = stream.into_split();
                inner.links.insert(
                    shuttle.clone(),
                    Link {
                        writer: Arc::new(Mutex::new(write_half)),
                        established_at_ms: now_ms,
                        inbound: false,
                    },
                );
                info!(shuttle = %shuttle, host, port, "shuttle link established");
                Ok(Some(read_half))
            }
        }
    }

    /// Install a link whose stream already exists (inbound from the
    /// listener). Replaces any previous link for the shuttle.
    pub async fn register(
        &self,
        shuttle: &ShuttleId,
        write_half: OwnedWriteHalf,
        inbound: bool,
        now_ms: u64,
    ) {
        let mut inner = self.inner.lock().await;
        let previous = inner.links.insert(
            shuttle.clone(),
            Link {
                writer: Arc::new(Mutex::new(write_half)),
                established_at_ms: now_ms,
                inbound,
            },
        );
        if previous.is_some() {
            debug!(shuttle = %shuttle, "replaced existing link");
        }
        info!(shuttle = %shuttle, inbound, "link registered");
    }

    /// Serialize one line onto the shuttle's link.
    pub async fn send_line(
        &self,
        shuttle: &ShuttleId,
        line: &str,
        timeout: Duration,
    ) -> Result<(), ConnectionError> {
        let writer = {
            let inner = self.inner.lock().await;
            let link = inner.links.get(shuttle).ok_or(ConnectionError::NotConnected)?;
            Arc::clone(&link.writer)
        };
        let mut writer = writer.lock().await;
        match sg_wire::write_line(&mut *writer, line, timeout).await {
            Ok(()) => Ok(()),
            Err(FrameError::Timeout) => Err(ConnectionError::SendTimeout),
            Err(FrameError::Io(e)) => Err(ConnectionError::Io(e)),
            Err(other) => Err(ConnectionError::Io(std::io::Error::other(other.to_string()))),
        }
    }

    /// Tear the link down and remove the entry; a later `acquire` redials.
    pub async fn close(&self, shuttle: &ShuttleId) {
        let link = {
            let mut inner = self.inner.lock().await;
            inner.links.remove(shuttle)
        };
        if let Some(link) = link {
            let mut writer = link.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!(shuttle = %shuttle, error = %e, "error shutting down link");
            }
            info!(shuttle = %shuttle, "link closed");
        }
    }

    /// Close every link (shutdown path).
    pub async fn close_all(&self) {
        let links = {
            let mut inner = self.inner.lock().await;
            std::mem::take(&mut inner.links)
        };
        for (shuttle, link) in links {
            let mut writer = link.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                warn!(shuttle = %shuttle, error = %e, "error shutting down link");
            }
        }
    }

    pub async fn is_connected(&self, shuttle: &ShuttleId) -> bool {
        self.inner.lock().await.links.contains_key(shuttle)
    }

    pub async fn established_at_ms(&self, shuttle: &ShuttleId) -> Option<u64> {
        self.inner.lock().await.links.get(shuttle).map(|l| l.established_at_ms)
    }

    /// Whether the current link was installed by the listener.
    pub async fn is_inbound(&self, shuttle: &ShuttleId) -> bool {
        self.inner
            .lock()
            .await
            .links
            .get(shuttle)
            .map(|l| l.inbound)
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
