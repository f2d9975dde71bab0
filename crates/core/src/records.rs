// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command registry: every submitted command and its lifecycle.
//!
//! Records exist so the WMS side can cancel queued work and observe
//! outcomes; they are snapshotted to the state store but never consulted
//! for scheduling decisions.

use crate::command::{CommandId, ShuttleCommand};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    CommandStatus {
        Queued => "queued",
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl CommandStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Cancelled
        )
    }
}

/// Registry record for one submitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub command: ShuttleCommand,
    pub status: CommandStatus,
    pub submitted_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-memory registry of submitted commands, keyed by [`CommandId`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandRegistry {
    records: HashMap<CommandId, CommandRecord>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command admitted to a queue.
    pub fn insert_queued(&mut self, id: CommandId, command: ShuttleCommand, now_ms: u64) {
        self.records.insert(
            id,
            CommandRecord {
                command,
                status: CommandStatus::Queued,
                submitted_at_ms: now_ms,
                completed_at_ms: None,
                cancelled_at_ms: None,
                error: None,
            },
        );
    }

    /// Record a command that completed without ever being queued (fast path).
    pub fn insert_completed(&mut self, id: CommandId, command: ShuttleCommand, now_ms: u64) {
        self.records.insert(
            id,
            CommandRecord {
                command,
                status: CommandStatus::Completed,
                submitted_at_ms: now_ms,
                completed_at_ms: Some(now_ms),
                cancelled_at_ms: None,
                error: None,
            },
        );
    }

    /// Record a command that failed at submission or on the fast path.
    pub fn insert_failed(
        &mut self,
        id: CommandId,
        command: ShuttleCommand,
        now_ms: u64,
        error: impl Into<String>,
    ) {
        self.records.insert(
            id,
            CommandRecord {
                command,
                status: CommandStatus::Failed,
                submitted_at_ms: now_ms,
                completed_at_ms: None,
                cancelled_at_ms: None,
                error: Some(error.into()),
            },
        );
    }

    /// Move a queued record to processing. Returns false for anything else.
    pub fn mark_processing(&mut self, id: &CommandId) -> bool {
        match self.records.get_mut(id) {
            Some(rec) if rec.status == CommandStatus::Queued => {
                rec.status = CommandStatus::Processing;
                true
            }
            _ => false,
        }
    }

    pub fn mark_completed(&mut self, id: &CommandId, now_ms: u64) {
        if let Some(rec) = self.records.get_mut(id) {
            rec.status = CommandStatus::Completed;
            rec.completed_at_ms = Some(now_ms);
        }
    }

    pub fn mark_failed(&mut self, id: &CommandId, now_ms: u64, error: impl Into<String>) {
        if let Some(rec) = self.records.get_mut(id) {
            rec.status = CommandStatus::Failed;
            rec.completed_at_ms = Some(now_ms);
            rec.error = Some(error.into());
        }
    }

    /// Cancel a queued command. Terminal and in-flight records refuse:
    /// only `queued` can be cancelled.
    pub fn mark_cancelled(&mut self, id: &CommandId, now_ms: u64) -> bool {
        match self.records.get_mut(id) {
            Some(rec) if rec.status == CommandStatus::Queued => {
                rec.status = CommandStatus::Cancelled;
                rec.cancelled_at_ms = Some(now_ms);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &CommandId) -> Option<&CommandRecord> {
        self.records.get(id)
    }

    pub fn status(&self, id: &CommandId) -> Option<CommandStatus> {
        self.records.get(id).map(|rec| rec.status)
    }

    pub fn is_cancelled(&self, id: &CommandId) -> bool {
        self.status(id) == Some(CommandStatus::Cancelled)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CommandId, &CommandRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
