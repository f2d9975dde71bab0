// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable shuttle state.
//!
//! One record per configured shuttle, mutated by the state engine (inbound
//! messages) and the dispatcher (outbound sends). The record is the source
//! of truth for "is this shuttle free" — completion of a command is inferred
//! from the status returning to FREE, there is no request/response
//! correlation on the wire.

use crate::command::{CommandKind, ShuttleCommand};
use crate::shuttle::ShuttleId;
use serde::{Deserialize, Serialize};

/// Observable status of a shuttle, driven by its unsolicited reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShuttleStatus {
    Unknown,
    Free,
    Busy,
    Moving,
    Loading,
    Unloading,
    Charging,
    LowBattery,
    NotReady,
    AwaitingMrcd,
    Error,
}

crate::simple_display! {
    ShuttleStatus {
        Unknown => "UNKNOWN",
        Free => "FREE",
        Busy => "BUSY",
        Moving => "MOVING",
        Loading => "LOADING",
        Unloading => "UNLOADING",
        Charging => "CHARGING",
        LowBattery => "LOW_BATTERY",
        NotReady => "NOT_READY",
        AwaitingMrcd => "AWAITING_MRCD",
        Error => "ERROR",
    }
}

/// State record for one shuttle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuttleState {
    pub shuttle_id: ShuttleId,
    pub status: ShuttleStatus,
    /// Wire form of the command currently executing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_command: Option<String>,
    /// The most recent command sent, with its WMS context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command: Option<ShuttleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_command_at_ms: Option<u64>,
    /// The most recent inbound line, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Epoch ms of the most recent inbound activity. Never decreases.
    #[serde(default)]
    pub last_seen_ms: u64,
    /// Opaque battery report; carries `%` and may be `<nn%`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_data: Option<String>,
    /// Cell parsed out of the last location blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pallet_count_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wdh_hours: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wlh_hours: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// WMS context stamped at dispatch time, used for the status callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_name: Option<String>,
}

impl ShuttleState {
    /// Fresh record for a configured shuttle; status starts UNKNOWN until
    /// the shuttle reports in.
    pub fn new(shuttle_id: impl Into<ShuttleId>) -> Self {
        Self {
            shuttle_id: shuttle_id.into(),
            status: ShuttleStatus::Unknown,
            current_command: None,
            last_command: None,
            last_command_at_ms: None,
            last_message: None,
            last_seen_ms: 0,
            battery_level: None,
            location_data: None,
            current_cell: None,
            pallet_count_data: None,
            wdh_hours: None,
            wlh_hours: None,
            error_code: None,
            external_id: None,
            document_type: None,
            cell_id: None,
            stock_name: None,
        }
    }

    /// Record inbound activity. `last_seen_ms` never decreases.
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = self.last_seen_ms.max(now_ms);
    }

    /// The shuttle finished its work: FREE, nothing in flight.
    pub fn clear_work(&mut self) {
        self.status = ShuttleStatus::Free;
        self.current_command = None;
    }

    /// The shuttle (or the transport) reported a fault.
    pub fn mark_error(&mut self, code: impl Into<String>) {
        self.status = ShuttleStatus::Error;
        self.error_code = Some(code.into());
        self.current_command = None;
    }

    /// Record a successful outbound send.
    ///
    /// `wire_line` is the encoded command without the trailing LF. Anything
    /// but MRCD puts the shuttle to work; the WMS context travels from the
    /// command onto the state so completion can be reported later.
    pub fn record_sent_command(&mut self, command: &ShuttleCommand, wire_line: &str, now_ms: u64) {
        self.last_command = Some(command.clone());
        self.last_command_at_ms = Some(now_ms);
        if command.kind != CommandKind::Mrcd {
            self.status = ShuttleStatus::Busy;
            self.current_command = Some(wire_line.to_string());
        }
        self.external_id = command.external_id.clone();
        self.document_type = command.document_type.clone();
        self.cell_id = command.cell_id.clone();
        self.stock_name = command.stock_name.clone();
    }

    /// Drop the WMS context once completion has been reported.
    pub fn clear_wms_context(&mut self) {
        self.external_id = None;
        self.document_type = None;
        self.cell_id = None;
        self.stock_name = None;
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct ShuttleStateBuilder {
    state: ShuttleState,
}

#[cfg(any(test, feature = "test-support"))]
impl ShuttleStateBuilder {
    pub fn new(shuttle_id: impl Into<ShuttleId>) -> Self {
        Self { state: ShuttleState::new(shuttle_id) }
    }

    pub fn status(mut self, status: ShuttleStatus) -> Self {
        self.state.status = status;
        self
    }

    pub fn current_command(mut self, line: impl Into<String>) -> Self {
        self.state.current_command = Some(line.into());
        self
    }

    pub fn last_seen_ms(mut self, ms: u64) -> Self {
        self.state.last_seen_ms = ms;
        self
    }

    pub fn battery_level(mut self, level: impl Into<String>) -> Self {
        self.state.battery_level = Some(level.into());
        self
    }

    pub fn external_id(mut self, id: impl Into<String>) -> Self {
        self.state.external_id = Some(id.into());
        self
    }

    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.state.error_code = Some(code.into());
        self
    }

    pub fn build(self) -> ShuttleState {
        self.state
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ShuttleState {
    /// Create a builder with test defaults.
    pub fn builder(shuttle_id: impl Into<ShuttleId>) -> ShuttleStateBuilder {
        ShuttleStateBuilder::new(shuttle_id)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
