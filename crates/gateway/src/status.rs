// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only status view for external consumers.

use sg_core::{ShuttleState, ShuttleStatus};
use serde::{Deserialize, Serialize};

/// One shuttle's row in the status surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: ShuttleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_command: Option<String>,
    pub last_seen_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&ShuttleState> for StatusEntry {
    fn from(state: &ShuttleState) -> Self {
        Self {
            status: state.status,
            current_command: state.current_command.clone(),
            last_seen_ms: state.last_seen_ms,
            battery_level: state.battery_level.clone(),
            location_data: state.location_data.clone(),
            current_cell: state.current_cell.clone(),
            error_code: state.error_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_projects_the_observable_fields() {
        let mut state = ShuttleState::builder("s1")
            .status(ShuttleStatus::Loading)
            .current_command("PALLET_IN-A1")
            .battery_level("72%")
            .last_seen_ms(500)
            .build();
        state.current_cell = Some("A1".to_string());

        let entry = StatusEntry::from(&state);
        assert_eq!(entry.status, ShuttleStatus::Loading);
        assert_eq!(entry.current_command.as_deref(), Some("PALLET_IN-A1"));
        assert_eq!(entry.current_cell.as_deref(), Some("A1"));
        assert_eq!(entry.last_seen_ms, 500);
        assert!(entry.error_code.is_none());

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "LOADING");
    }
}
