// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::command::CommandKind;

fn cmd(kind: CommandKind) -> ShuttleCommand {
    ShuttleCommand::new(kind, "s1")
}

fn id(s: &str) -> CommandId {
    CommandId::new(s)
}

#[test]
fn queued_record_lifecycle_to_completed() {
    let mut reg = CommandRegistry::new();
    reg.insert_queued(id("a"), cmd(CommandKind::PalletIn), 100);
    assert_eq!(reg.status(&id("a")), Some(CommandStatus::Queued));

    assert!(reg.mark_processing(&id("a")));
    assert_eq!(reg.status(&id("a")), Some(CommandStatus::Processing));

    reg.mark_completed(&id("a"), 200);
    let rec = reg.get(&id("a")).unwrap();
    assert_eq!(rec.status, CommandStatus::Completed);
    assert_eq!(rec.completed_at_ms, Some(200));
}

#[test]
fn mark_failed_records_error_text() {
    let mut reg = CommandRegistry::new();
    reg.insert_queued(id("a"), cmd(CommandKind::Fifo), 100);
    reg.mark_failed(&id("a"), 150, "SEND_TIMEOUT");
    let rec = reg.get(&id("a")).unwrap();
    assert_eq!(rec.status, CommandStatus::Failed);
    assert_eq!(rec.error.as_deref(), Some("SEND_TIMEOUT"));
}

#[test]
fn cancel_only_succeeds_from_queued() {
    let mut reg = CommandRegistry::new();
    reg.insert_queued(id("q"), cmd(CommandKind::Count), 1);
    assert!(reg.mark_cancelled(&id("q"), 2));
    assert!(reg.is_cancelled(&id("q")));
    assert_eq!(reg.get(&id("q")).unwrap().cancelled_at_ms, Some(2));

    // Cancelling again, or cancelling non-queued records, refuses.
    assert!(!reg.mark_cancelled(&id("q"), 3));

    reg.insert_queued(id("p"), cmd(CommandKind::Count), 1);
    reg.mark_processing(&id("p"));
    assert!(!reg.mark_cancelled(&id("p"), 2));
    assert_eq!(reg.status(&id("p")), Some(CommandStatus::Processing));

    reg.insert_completed(id("c"), cmd(CommandKind::Home), 1);
    assert!(!reg.mark_cancelled(&id("c"), 2));
}

#[test]
fn mark_processing_refuses_unknown_and_terminal() {
    let mut reg = CommandRegistry::new();
    assert!(!reg.mark_processing(&id("missing")));
    reg.insert_failed(id("f"), cmd(CommandKind::Wdh), 1, "Queue full");
    assert!(!reg.mark_processing(&id("f")));
}

#[test]
fn terminal_statuses_are_terminal() {
    assert!(CommandStatus::Completed.is_terminal());
    assert!(CommandStatus::Failed.is_terminal());
    assert!(CommandStatus::Cancelled.is_terminal());
    assert!(!CommandStatus::Queued.is_terminal());
    assert!(!CommandStatus::Processing.is_terminal());
}

#[test]
fn registry_serde_round_trip() {
    let mut reg = CommandRegistry::new();
    reg.insert_queued(id("a"), cmd(CommandKind::PalletIn), 100);
    reg.insert_failed(id("b"), cmd(CommandKind::Filo), 100, "Queue full");

    let json = serde_json::to_string(&reg).unwrap();
    let back: CommandRegistry = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back.status(&id("a")), Some(CommandStatus::Queued));
    assert_eq!(back.get(&id("b")).unwrap().error.as_deref(), Some("Queue full"));
}
