// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shuttle health monitor.
//!
//! Periodically probes shuttles that look dead — status ERROR/UNKNOWN or
//! no inbound activity for over a minute — by submitting a fast-path
//! STATUS command, which redials the link as a side effect.

use crate::engine::StateEngine;
use crate::scheduler::CommandScheduler;
use crate::GatewayConfig;
use sg_core::{Clock, CommandKind, ShuttleCommand, ShuttleId, ShuttleStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tick between monitor sweeps; individual shuttles are probed at the
/// configured health-check interval, not every tick.
const SWEEP_TICK: Duration = Duration::from_secs(5);

/// A shuttle silent for longer than this is probed even if its status
/// still looks healthy.
const SILENCE_THRESHOLD_MS: u64 = 60_000;

pub struct ShuttleMonitor<C: Clock> {
    engine: Arc<StateEngine<C>>,
    scheduler: Arc<CommandScheduler<C>>,
    config: Arc<GatewayConfig>,
    clock: C,
}

impl<C: Clock> ShuttleMonitor<C> {
    pub fn new(
        engine: Arc<StateEngine<C>>,
        scheduler: Arc<CommandScheduler<C>>,
        config: Arc<GatewayConfig>,
        clock: C,
    ) -> Self {
        Self { engine, scheduler, config, clock }
    }

    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!("shuttle monitor started");
        let interval_ms = self.config.shuttle_health_check_interval * 1_000;
        let mut last_check: HashMap<ShuttleId, u64> = HashMap::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(SWEEP_TICK) => {}
            }

            for shuttle in self.config.shuttles.keys() {
                let now_ms = self.clock.epoch_ms();
                let due = last_check
                    .get(shuttle)
                    .map(|at| now_ms.saturating_sub(*at) >= interval_ms)
                    .unwrap_or(true);
                if !due {
                    continue;
                }
                last_check.insert(shuttle.clone(), now_ms);
                self.check_shuttle(shuttle, now_ms).await;
            }
        }
        info!("shuttle monitor stopped");
    }

    async fn check_shuttle(&self, shuttle: &ShuttleId, now_ms: u64) {
        let Some(state) = self.engine.state(shuttle) else { return };
        let (status, last_seen_ms) = {
            let state = state.lock();
            (state.status, state.last_seen_ms)
        };

        let silent = now_ms.saturating_sub(last_seen_ms) > SILENCE_THRESHOLD_MS;
        let unhealthy =
            matches!(status, ShuttleStatus::Error | ShuttleStatus::Unknown) || silent;
        if !unhealthy {
            return;
        }

        info!(shuttle = %shuttle, %status, silent, "probing unresponsive shuttle");
        let probe = ShuttleCommand::new(CommandKind::Status, shuttle.clone());
        if let Err(e) = self.scheduler.submit(probe).await {
            warn!(shuttle = %shuttle, error = %e, "health probe failed to submit");
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
