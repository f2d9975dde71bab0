// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority command scheduler.
//!
//! Per shuttle: a bounded min-heap of queued commands and one async mutex
//! serializing every outbound write on that shuttle — queued dispatches,
//! fast-path dispatches, and cancellation drains all contend on it, so at
//! most one command is ever inside the dispatcher per shuttle.
//!
//! HOME always preempts; STATUS/BATTERY/MRCD (priority ≤ 4) also bypass
//! the queue and run as soon as the lock can be taken, regardless of the
//! shuttle's status. Everything else waits until the shuttle is FREE.

use crate::dispatch::Dispatcher;
use crate::engine::StateEngine;
use crate::GatewayConfig;
use sg_core::{
    Clock, CommandId, CommandRegistry, CommandStatus, ShuttleCommand, ShuttleId, ShuttleStatus,
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Pause between full worker rotations, bounding busy-wait.
const WORKER_ROTATION_PAUSE: Duration = Duration::from_millis(500);

/// Errors from command submission.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("shuttle {0} is not configured")]
    UnknownShuttle(ShuttleId),

    #[error("command queue for shuttle {0} is full")]
    QueueFull(ShuttleId),
}

/// Heap entry; ordering inverted so the `BinaryHeap` pops the lowest
/// `(priority, seq)` first.
#[derive(Debug)]
struct QueuedEntry {
    priority: u8,
    seq: u64,
    id: CommandId,
    command: ShuttleCommand,
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.priority, other.seq).cmp(&(self.priority, self.seq))
    }
}

/// Bounded priority queue for one shuttle.
struct CommandQueue {
    heap: BinaryHeap<QueuedEntry>,
    capacity: usize,
}

impl CommandQueue {
    fn new(capacity: usize) -> Self {
        Self { heap: BinaryHeap::new(), capacity }
    }

    fn push(&mut self, entry: QueuedEntry) -> bool {
        if self.heap.len() >= self.capacity {
            return false;
        }
        self.heap.push(entry);
        true
    }

    fn pop(&mut self) -> Option<QueuedEntry> {
        self.heap.pop()
    }

    /// Drop one entry by ID, keeping the rest.
    fn remove(&mut self, id: &CommandId) {
        let entries = std::mem::take(&mut self.heap);
        self.heap = entries.into_iter().filter(|entry| &entry.id != id).collect();
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Queue plus the per-shuttle serialization lock.
struct ShuttleSlot {
    queue: parking_lot::Mutex<CommandQueue>,
    /// Guards every dispatch on this shuttle's link.
    lock: tokio::sync::Mutex<()>,
}

/// Scheduler over all configured shuttles.
pub struct CommandScheduler<C: Clock> {
    slots: BTreeMap<ShuttleId, ShuttleSlot>,
    registry: Arc<parking_lot::Mutex<CommandRegistry>>,
    dispatcher: Arc<Dispatcher<C>>,
    engine: Arc<StateEngine<C>>,
    clock: C,
    /// Submission tie-breaker within one timestamp.
    seq: AtomicU64,
}

impl<C: Clock> CommandScheduler<C> {
    pub fn new(
        config: &GatewayConfig,
        dispatcher: Arc<Dispatcher<C>>,
        engine: Arc<StateEngine<C>>,
        clock: C,
    ) -> Self {
        let slots = config
            .shuttles
            .keys()
            .map(|id| {
                (
                    id.clone(),
                    ShuttleSlot {
                        queue: parking_lot::Mutex::new(CommandQueue::new(
                            config.command_queue_max_size,
                        )),
                        lock: tokio::sync::Mutex::new(()),
                    },
                )
            })
            .collect();
        Self {
            slots,
            registry: Arc::new(parking_lot::Mutex::new(CommandRegistry::new())),
            dispatcher,
            engine,
            clock,
            seq: AtomicU64::new(0),
        }
    }

    /// Shared command registry, for persistence and observation.
    pub fn command_registry(&self) -> Arc<parking_lot::Mutex<CommandRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Submit a command: fast-path kinds dispatch immediately under the
    /// shuttle's lock, everything else is queued.
    ///
    /// The returned ID identifies the registry record either way; a
    /// fast-path dispatch failure is reported there, not as an `Err`.
    pub async fn submit(&self, command: ShuttleCommand) -> Result<CommandId, SubmitError> {
        let slot = self
            .slots
            .get(&command.shuttle)
            .ok_or_else(|| SubmitError::UnknownShuttle(command.shuttle.clone()))?;
        let id = CommandId::generate(&command, &self.clock);

        if command.is_fast_path() {
            info!(shuttle = %command.shuttle, kind = %command.kind, id = %id, "fast-path dispatch");
            let _guard = slot.lock.lock().await;
            let now_ms = self.clock.epoch_ms();
            match self.dispatcher.dispatch(&command).await {
                Ok(()) => self.registry.lock().insert_completed(id.clone(), command, now_ms),
                Err(e) => {
                    error!(id = %id, error = %e, "fast-path dispatch failed");
                    self.registry.lock().insert_failed(id.clone(), command, now_ms, e.to_string());
                }
            }
            return Ok(id);
        }

        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let entry = QueuedEntry {
            priority: command.priority,
            seq,
            id: id.clone(),
            command: command.clone(),
        };
        let now_ms = self.clock.epoch_ms();
        let (pushed, depth) = {
            let mut queue = slot.queue.lock();
            let pushed = queue.push(entry);
            (pushed, queue.len())
        };
        if !pushed {
            error!(shuttle = %command.shuttle, id = %id, "command queue full");
            let shuttle = command.shuttle.clone();
            self.registry.lock().insert_failed(id, command, now_ms, "Queue full");
            return Err(SubmitError::QueueFull(shuttle));
        }
        self.registry.lock().insert_queued(id.clone(), command, now_ms);
        debug!(id = %id, depth, "command queued");
        Ok(id)
    }

    /// Cancel a queued command. Anything not in `queued` refuses and
    /// nothing is mutated.
    pub async fn cancel(&self, id: &CommandId) -> bool {
        let shuttle = {
            let registry = self.registry.lock();
            match registry.get(id) {
                Some(rec) if rec.status == CommandStatus::Queued => rec.command.shuttle.clone(),
                _ => {
                    debug!(id = %id, "cancel refused: not queued");
                    return false;
                }
            }
        };
        let Some(slot) = self.slots.get(&shuttle) else { return false };

        let _guard = slot.lock.lock().await;
        slot.queue.lock().remove(id);
        let cancelled = self.registry.lock().mark_cancelled(id, self.clock.epoch_ms());
        if cancelled {
            info!(id = %id, shuttle = %shuttle, "command cancelled");
        }
        cancelled
    }

    /// Number of commands waiting for one shuttle.
    pub fn queue_depth(&self, shuttle: &ShuttleId) -> usize {
        self.slots.get(shuttle).map(|slot| slot.queue.lock().len()).unwrap_or(0)
    }

    /// Spawn the worker fibers. Each rotates over every shuttle, pulling
    /// the head of any queue whose shuttle is FREE and unlocked.
    pub fn spawn_workers(
        self: &Arc<Self>,
        count: usize,
        token: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (1..=count)
            .map(|worker_id| {
                let scheduler = Arc::clone(self);
                let token = token.clone();
                tokio::spawn(async move { scheduler.worker_loop(worker_id, token).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, token: CancellationToken) {
        info!(worker_id, "command worker started");
        loop {
            if token.is_cancelled() {
                break;
            }
            self.drain_ready_shuttles().await;
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(WORKER_ROTATION_PAUSE) => {}
            }
        }
        info!(worker_id, "command worker stopped");
    }

    /// One rotation over all shuttles.
    async fn drain_ready_shuttles(&self) {
        for (shuttle, slot) in &self.slots {
            // Lock held → a fast-path or another worker owns this shuttle.
            let Ok(_guard) = slot.lock.try_lock() else { continue };

            if self.engine.status_of(shuttle) != ShuttleStatus::Free {
                continue;
            }

            let Some(entry) = slot.queue.lock().pop() else { continue };

            if self.registry.lock().is_cancelled(&entry.id) {
                debug!(id = %entry.id, "dropping cancelled command");
                continue;
            }

            self.registry.lock().mark_processing(&entry.id);
            let result = self.dispatcher.dispatch(&entry.command).await;
            let now_ms = self.clock.epoch_ms();
            match result {
                Ok(()) => self.registry.lock().mark_completed(&entry.id, now_ms),
                Err(e) => {
                    error!(id = %entry.id, error = %e, "queued dispatch failed");
                    self.registry.lock().mark_failed(&entry.id, now_ms, e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
