// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound shuttle messages.
//!
//! One variant per utterance kind. [`Message::parse`] is total: rules apply
//! in a fixed order and the first match wins, anything left over lands in
//! [`Message::Other`] and is acknowledged without interpretation.

use sg_core::ShuttleStatus;

/// A single decoded line from a shuttle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `<OP>_STARTED` — operation accepted and under way.
    Started { op: String },
    /// `<OP>_DONE` — operation finished.
    Done { op: String },
    /// `<OP>_ABORT` — operation abandoned; the whole line becomes the error code.
    Abort { line: String },
    /// `LOCATION=<blob>`, with the `CELL:` fragment extracted when present.
    Location { raw: String, cell: Option<String> },
    /// `COUNT_*=…` pallet count report, kept verbatim.
    Count { line: String },
    /// `STATUS=<token>`; the token is uppercased but otherwise raw.
    Status { reported: String },
    /// `BATTERY=<value>`; value is opaque (`<15%` is valid).
    Battery { raw: String },
    /// `WDH=<hours>` drive-hour counter; `None` when the payload is not an integer.
    Wdh { hours: Option<i64> },
    /// `WLH=<hours>` load-hour counter; `None` when the payload is not an integer.
    Wlh { hours: Option<i64> },
    /// `F_CODE=<code>` fault report; the whole line becomes the error code.
    FCode { line: String },
    /// The acknowledgement token itself. Never acknowledged back.
    Mrcd,
    /// Anything else.
    Other { line: String },
}

impl Message {
    /// Decode one trimmed line.
    pub fn parse(line: &str) -> Message {
        let line = line.trim();

        if line == "MRCD" {
            return Message::Mrcd;
        }
        if let Some(op) = line.strip_suffix("_STARTED") {
            return Message::Started { op: op.to_string() };
        }
        if let Some(op) = line.strip_suffix("_DONE") {
            return Message::Done { op: op.to_string() };
        }
        if line.ends_with("_ABORT") {
            return Message::Abort { line: line.to_string() };
        }
        if let Some(raw) = line.strip_prefix("LOCATION=") {
            return Message::Location { raw: raw.to_string(), cell: extract_cell(raw) };
        }
        if line.starts_with("COUNT_") && line.contains('=') {
            return Message::Count { line: line.to_string() };
        }
        if let Some(value) = line.strip_prefix("STATUS=") {
            return Message::Status { reported: value.trim().to_uppercase() };
        }
        if let Some(value) = line.strip_prefix("BATTERY=") {
            return Message::Battery { raw: value.trim().to_string() };
        }
        if let Some(value) = line.strip_prefix("WDH=") {
            return Message::Wdh { hours: value.trim().parse().ok() };
        }
        if let Some(value) = line.strip_prefix("WLH=") {
            return Message::Wlh { hours: value.trim().parse().ok() };
        }
        if line.starts_with("F_CODE=") {
            return Message::FCode { line: line.to_string() };
        }
        Message::Other { line: line.to_string() }
    }
}

/// Pull `CELL:<id>` out of a location blob; the id runs to the next `,`
/// or to the end of the blob.
fn extract_cell(raw: &str) -> Option<String> {
    let after = raw.split_once("CELL:")?.1;
    let cell = after.split(',').next().unwrap_or(after).trim();
    if cell.is_empty() {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Map a reported status token onto the observable status.
///
/// `CARGO` folds into BUSY; anything unrecognized is UNKNOWN.
pub fn map_reported_status(reported: &str) -> ShuttleStatus {
    match reported {
        "FREE" => ShuttleStatus::Free,
        "CARGO" | "BUSY" => ShuttleStatus::Busy,
        "NOT_READY" => ShuttleStatus::NotReady,
        "MOVING" => ShuttleStatus::Moving,
        "LOADING" => ShuttleStatus::Loading,
        "UNLOADING" => ShuttleStatus::Unloading,
        "CHARGING" => ShuttleStatus::Charging,
        "LOW_BATTERY" => ShuttleStatus::LowBattery,
        _ => ShuttleStatus::Unknown,
    }
}

/// Parse a battery report into a percentage, tolerating `%` and a leading
/// `<` ("<15%" reads as 15.0). `None` when the payload is not numeric.
pub fn battery_percent(raw: &str) -> Option<f64> {
    raw.trim().replace('%', "").trim_start_matches('<').parse().ok()
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
