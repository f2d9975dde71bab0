// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shuttle commands, their default priorities, and registry IDs.

use crate::clock::Clock;
use crate::shuttle::ShuttleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest numeric priority that still dispatches on the fast path
/// (HOME, STATUS, BATTERY, MRCD bypass the queue).
pub const FAST_PATH_MAX_PRIORITY: u8 = 4;

/// Commands the gateway can send to a shuttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    PalletIn,
    PalletOut,
    Fifo,
    Filo,
    StackIn,
    StackOut,
    Home,
    Count,
    Status,
    Battery,
    Wdh,
    Wlh,
    Mrcd,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl CommandKind {
    /// The command name as it appears on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            CommandKind::PalletIn => "PALLET_IN",
            CommandKind::PalletOut => "PALLET_OUT",
            CommandKind::Fifo => "FIFO",
            CommandKind::Filo => "FILO",
            CommandKind::StackIn => "STACK_IN",
            CommandKind::StackOut => "STACK_OUT",
            CommandKind::Home => "HOME",
            CommandKind::Count => "COUNT",
            CommandKind::Status => "STATUS",
            CommandKind::Battery => "BATTERY",
            CommandKind::Wdh => "WDH",
            CommandKind::Wlh => "WLH",
            CommandKind::Mrcd => "MRCD",
        }
    }

    /// Default scheduling priority (lower = more urgent).
    pub fn default_priority(&self) -> u8 {
        match self {
            CommandKind::Home => 1,
            CommandKind::Status => 2,
            CommandKind::Battery => 3,
            CommandKind::Mrcd => 4,
            CommandKind::PalletOut => 5,
            CommandKind::PalletIn => 6,
            CommandKind::StackOut => 7,
            CommandKind::StackIn => 8,
            CommandKind::Fifo => 9,
            CommandKind::Filo => 10,
            CommandKind::Count => 11,
            CommandKind::Wdh => 12,
            CommandKind::Wlh => 13,
        }
    }

    /// Whether this kind dispatches immediately, bypassing the queue.
    pub fn is_fast_path(&self) -> bool {
        self.default_priority() <= FAST_PATH_MAX_PRIORITY
    }
}

/// Error returned when parsing an unrecognized command name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown shuttle command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for CommandKind {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PALLET_IN" => Ok(CommandKind::PalletIn),
            "PALLET_OUT" => Ok(CommandKind::PalletOut),
            "FIFO" => Ok(CommandKind::Fifo),
            "FILO" => Ok(CommandKind::Filo),
            "STACK_IN" => Ok(CommandKind::StackIn),
            "STACK_OUT" => Ok(CommandKind::StackOut),
            "HOME" => Ok(CommandKind::Home),
            "COUNT" => Ok(CommandKind::Count),
            "STATUS" => Ok(CommandKind::Status),
            "BATTERY" => Ok(CommandKind::Battery),
            "WDH" => Ok(CommandKind::Wdh),
            "WLH" => Ok(CommandKind::Wlh),
            "MRCD" => Ok(CommandKind::Mrcd),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// A command bound for a shuttle, immutable once constructed.
///
/// The optional WMS fields travel with the command so that the state record
/// can be stamped at dispatch time and the completion reported back against
/// the right work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuttleCommand {
    pub kind: CommandKind,
    pub shuttle: ShuttleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_name: Option<String>,
    /// Scheduling priority; defaults from the kind, overridable per command.
    pub priority: u8,
}

impl ShuttleCommand {
    /// Create a command with the kind's default priority and no parameters.
    pub fn new(kind: CommandKind, shuttle: impl Into<ShuttleId>) -> Self {
        Self {
            kind,
            shuttle: shuttle.into(),
            params: None,
            external_id: None,
            document_type: None,
            cell_id: None,
            stock_name: None,
            priority: kind.default_priority(),
        }
    }

    crate::setters! {
        set {
            priority: u8,
        }
        option {
            params: String,
            external_id: String,
            document_type: String,
            cell_id: String,
            stock_name: String,
        }
    }

    /// Whether this command dispatches immediately, bypassing the queue.
    ///
    /// Uses the effective priority, so an override can promote or demote a
    /// command relative to its kind's default.
    pub fn is_fast_path(&self) -> bool {
        self.kind == CommandKind::Home || self.priority <= FAST_PATH_MAX_PRIORITY
    }
}

/// Registry key for a submitted command: `<shuttle>_<TYPE>_<epoch-ms>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate an ID for a command at the current clock reading.
    pub fn generate(command: &ShuttleCommand, clock: &impl Clock) -> Self {
        Self(format!("{}_{}_{}", command.shuttle, command.kind, clock.epoch_ms()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
