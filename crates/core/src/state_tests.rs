// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_state_starts_unknown_with_nothing_in_flight() {
    let state = ShuttleState::new("s1");
    assert_eq!(state.status, ShuttleStatus::Unknown);
    assert!(state.current_command.is_none());
    assert_eq!(state.last_seen_ms, 0);
}

#[test]
fn touch_never_decreases_last_seen() {
    let mut state = ShuttleState::new("s1");
    state.touch(1_000);
    assert_eq!(state.last_seen_ms, 1_000);
    state.touch(500);
    assert_eq!(state.last_seen_ms, 1_000);
    state.touch(2_000);
    assert_eq!(state.last_seen_ms, 2_000);
}

#[test]
fn clear_work_frees_the_shuttle() {
    let mut state = ShuttleState::builder("s1")
        .status(ShuttleStatus::Loading)
        .current_command("PALLET_IN-A1")
        .build();
    state.clear_work();
    assert_eq!(state.status, ShuttleStatus::Free);
    assert!(state.current_command.is_none());
}

#[test]
fn mark_error_records_code_and_clears_command() {
    let mut state = ShuttleState::builder("s1")
        .status(ShuttleStatus::Busy)
        .current_command("FIFO-003")
        .build();
    state.mark_error("F_CODE=17");
    assert_eq!(state.status, ShuttleStatus::Error);
    assert_eq!(state.error_code.as_deref(), Some("F_CODE=17"));
    assert!(state.current_command.is_none());
}

#[test]
fn record_sent_command_marks_busy_and_stamps_context() {
    let mut state = ShuttleState::new("s1");
    let cmd = ShuttleCommand::new(CommandKind::PalletIn, "s1")
        .params("A1")
        .external_id("ext-9")
        .document_type("shipment")
        .cell_id("A1")
        .stock_name("main");
    state.record_sent_command(&cmd, "PALLET_IN-A1", 5_000);

    assert_eq!(state.status, ShuttleStatus::Busy);
    assert_eq!(state.current_command.as_deref(), Some("PALLET_IN-A1"));
    assert_eq!(state.last_command_at_ms, Some(5_000));
    assert_eq!(state.external_id.as_deref(), Some("ext-9"));
    assert_eq!(state.stock_name.as_deref(), Some("main"));
}

#[test]
fn record_sent_mrcd_does_not_occupy_the_shuttle() {
    let mut state = ShuttleState::builder("s1").status(ShuttleStatus::Free).build();
    let ack = ShuttleCommand::new(CommandKind::Mrcd, "s1");
    state.record_sent_command(&ack, "MRCD", 6_000);
    assert_eq!(state.status, ShuttleStatus::Free);
    assert!(state.current_command.is_none());
    assert_eq!(state.last_command_at_ms, Some(6_000));
}

#[test]
fn clear_wms_context_drops_all_four_fields() {
    let mut state = ShuttleState::new("s1");
    let cmd = ShuttleCommand::new(CommandKind::Fifo, "s1")
        .external_id("e")
        .document_type("transfer")
        .cell_id("B2")
        .stock_name("north");
    state.record_sent_command(&cmd, "FIFO", 1);
    state.clear_wms_context();
    assert!(state.external_id.is_none());
    assert!(state.document_type.is_none());
    assert!(state.cell_id.is_none());
    assert!(state.stock_name.is_none());
}

#[test]
fn status_serializes_to_wire_names() {
    let json = serde_json::to_string(&ShuttleStatus::LowBattery).unwrap();
    assert_eq!(json, "\"LOW_BATTERY\"");
    let back: ShuttleStatus = serde_json::from_str("\"NOT_READY\"").unwrap();
    assert_eq!(back, ShuttleStatus::NotReady);
    assert_eq!(ShuttleStatus::AwaitingMrcd.to_string(), "AWAITING_MRCD");
}

// Every state reachable through the message rules must survive a snapshot
// round trip unchanged.
#[test]
fn state_json_round_trip_is_lossless() {
    let samples = [
        ShuttleState::new("s1"),
        ShuttleState::builder("s1").status(ShuttleStatus::Free).last_seen_ms(9_000).build(),
        {
            let mut s = ShuttleState::builder("s2")
                .status(ShuttleStatus::Loading)
                .current_command("PALLET_IN-A1")
                .battery_level("<15%")
                .build();
            s.location_data = Some("X:1,Y:2,CELL:A1".to_string());
            s.current_cell = Some("A1".to_string());
            s.wdh_hours = Some(120);
            s.wlh_hours = Some(80);
            s.last_message = Some("PALLET_IN_STARTED".to_string());
            s
        },
        {
            let mut s = ShuttleState::builder("s3")
                .status(ShuttleStatus::Error)
                .error_code("NO_RESPONSE_TIMEOUT")
                .external_id("ext-1")
                .build();
            s.last_command =
                Some(ShuttleCommand::new(CommandKind::StackOut, "s3").params("2"));
            s.last_command_at_ms = Some(77);
            s.pallet_count_data = Some("COUNT_TOTAL=14".to_string());
            s
        },
    ];

    for state in samples {
        let json = serde_json::to_string(&state).unwrap();
        let back: ShuttleState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
