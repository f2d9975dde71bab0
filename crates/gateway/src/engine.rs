// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-shuttle state engine.
//!
//! Consumes inbound lines, mutates the observable state per the protocol
//! rules, and auto-acknowledges every non-MRCD utterance. Completion is
//! inferred from the status returning to FREE — there is no request ID on
//! the wire, so these transitions are the scheduler's only gate.

use crate::registry::ConnectionRegistry;
use crate::status::StatusEntry;
use parking_lot::Mutex;
use sg_core::{Clock, ShuttleId, ShuttleState, ShuttleStatus};
use sg_wire::{battery_percent, map_reported_status, Message, MRCD_LINE};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// State engine for all configured shuttles.
pub struct StateEngine<C: Clock> {
    /// One record per configured shuttle, fixed at startup.
    states: HashMap<ShuttleId, Arc<Mutex<ShuttleState>>>,
    registry: Arc<ConnectionRegistry>,
    clock: C,
    write_timeout: Duration,
}

impl<C: Clock> StateEngine<C> {
    /// Build the engine with fresh records for `shuttles`, seeded from
    /// `restored` where a snapshot exists.
    pub fn new(
        shuttles: impl IntoIterator<Item = ShuttleId>,
        restored: HashMap<ShuttleId, ShuttleState>,
        registry: Arc<ConnectionRegistry>,
        clock: C,
        write_timeout: Duration,
    ) -> Self {
        let mut restored = restored;
        let states = shuttles
            .into_iter()
            .map(|id| {
                let state = restored.remove(&id).unwrap_or_else(|| ShuttleState::new(id.clone()));
                (id, Arc::new(Mutex::new(state)))
            })
            .collect();
        Self { states, registry, clock, write_timeout }
    }

    /// Handle one inbound line from `shuttle`.
    ///
    /// `last_seen` and `last_message` update before the message rules run.
    /// Lines from unconfigured shuttles (temp IDs) are acknowledged but
    /// mutate nothing.
    pub async fn handle_line(&self, shuttle: &ShuttleId, line: &str) {
        let now_ms = self.clock.epoch_ms();
        let message = Message::parse(line);

        match self.states.get(shuttle) {
            Some(state) => {
                let mut state = state.lock();
                state.touch(now_ms);
                state.last_message = Some(line.to_string());
                apply_message(&mut state, &message);
            }
            None => {
                info!(shuttle = %shuttle, line, "message from unconfigured shuttle");
            }
        }

        if message != Message::Mrcd {
            if let Err(e) = self.registry.send_line(shuttle, MRCD_LINE, self.write_timeout).await {
                warn!(shuttle = %shuttle, error = %e, "failed to send MRCD ack");
            }
        }
    }

    /// Whether a state record exists for this shuttle.
    pub fn is_known(&self, shuttle: &ShuttleId) -> bool {
        self.states.contains_key(shuttle)
    }

    pub fn state(&self, shuttle: &ShuttleId) -> Option<&Arc<Mutex<ShuttleState>>> {
        self.states.get(shuttle)
    }

    /// Current status, UNKNOWN for unconfigured shuttles.
    pub fn status_of(&self, shuttle: &ShuttleId) -> ShuttleStatus {
        self.states
            .get(shuttle)
            .map(|s| s.lock().status)
            .unwrap_or(ShuttleStatus::Unknown)
    }

    pub fn states(&self) -> impl Iterator<Item = (&ShuttleId, &Arc<Mutex<ShuttleState>>)> {
        self.states.iter()
    }

    /// Read-only view for the external status surface.
    pub fn status_view(&self) -> BTreeMap<ShuttleId, StatusEntry> {
        self.states
            .iter()
            .map(|(id, state)| (id.clone(), StatusEntry::from(&*state.lock())))
            .collect()
    }
}

/// Apply one decoded message to a state record. First-match-wins rule
/// order is already baked into [`Message::parse`]; this match is the
/// exhaustive effect table.
fn apply_message(state: &mut ShuttleState, message: &Message) {
    match message {
        Message::Started { op } => {
            state.status = if op.contains("PALLET_IN") {
                ShuttleStatus::Loading
            } else if op.contains("PALLET_OUT") {
                ShuttleStatus::Unloading
            } else if op.contains("HOME") {
                ShuttleStatus::Moving
            } else {
                ShuttleStatus::Busy
            };
            info!(shuttle = %state.shuttle_id, op = %op, status = %state.status, "operation started");
        }
        Message::Done { op } => {
            state.clear_work();
            info!(shuttle = %state.shuttle_id, op = %op, "operation done");
        }
        Message::Abort { line } => {
            state.mark_error(line.clone());
            warn!(shuttle = %state.shuttle_id, line = %line, "operation aborted");
        }
        Message::Location { raw, cell } => {
            state.location_data = Some(raw.clone());
            state.clear_work();
            if let Some(cell) = cell {
                state.current_cell = Some(cell.clone());
                info!(shuttle = %state.shuttle_id, cell = %cell, "shuttle reported cell");
            }
        }
        Message::Count { line } => {
            state.pallet_count_data = Some(line.clone());
            state.clear_work();
        }
        Message::Status { reported } => {
            let mapped = map_reported_status(reported);
            if state.status != mapped {
                info!(
                    shuttle = %state.shuttle_id,
                    from = %state.status,
                    to = %mapped,
                    "status changed"
                );
            }
            state.status = mapped;
            if matches!(
                mapped,
                ShuttleStatus::Free | ShuttleStatus::NotReady | ShuttleStatus::Unknown
            ) {
                state.current_command = None;
            }
        }
        Message::Battery { raw } => {
            state.battery_level = Some(raw.clone());
            match battery_percent(raw) {
                Some(level) if level < 20.0 => {
                    state.status = ShuttleStatus::LowBattery;
                    warn!(shuttle = %state.shuttle_id, level, "battery low");
                }
                Some(_) => {}
                None => warn!(shuttle = %state.shuttle_id, raw = %raw, "unparseable battery report"),
            }
        }
        Message::Wdh { hours } => match hours {
            Some(hours) => state.wdh_hours = Some(*hours),
            None => warn!(shuttle = %state.shuttle_id, "unparseable drive-hour report"),
        },
        Message::Wlh { hours } => match hours {
            Some(hours) => state.wlh_hours = Some(*hours),
            None => warn!(shuttle = %state.shuttle_id, "unparseable load-hour report"),
        },
        Message::FCode { line } => {
            state.mark_error(line.clone());
            error!(shuttle = %state.shuttle_id, line = %line, "shuttle reported fault");
        }
        Message::Mrcd => {}
        Message::Other { line } => {
            debug!(shuttle = %state.shuttle_id, line = %line, "unrecognized message");
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
