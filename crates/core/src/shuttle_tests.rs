// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn configured_ids_are_taken_verbatim() {
    let id = ShuttleId::new("s1");
    assert_eq!(id.as_str(), "s1");
    assert_eq!(id.to_string(), "s1");
    assert!(!id.is_temp());
    assert!(!id.is_virtual());
}

#[parameterized(
    ipv4 = { "10.9.8.7", "temp_shuttle_10_9_8_7" },
    ipv6 = { "2001:db8::7", "temp_shuttle_2001_db8__7" },
    loopback = { "127.0.0.1", "temp_shuttle_127_0_0_1" },
)]
fn temp_identity_flattens_the_address(ip: &str, expected: &str) {
    let id = ShuttleId::temp_for_ip(ip.parse().unwrap());
    assert_eq!(id, expected);
    assert!(id.is_temp());
}

#[test]
fn virtual_prefix_marks_simulator_shuttles() {
    assert!(ShuttleId::new("virtual1").is_virtual());
    assert!(!ShuttleId::new("s1").is_virtual());
    // A minted identity is never a simulator.
    assert!(!ShuttleId::temp_for_ip("10.0.0.1".parse().unwrap()).is_virtual());
}

#[test]
fn map_lookups_take_plain_str_keys() {
    let mut map = std::collections::BTreeMap::new();
    map.insert(ShuttleId::new("s2"), 2);
    map.insert(ShuttleId::new("s1"), 1);
    assert_eq!(map.get("s1"), Some(&1));
    // BTreeMap iteration is ordered, so "first configured" is stable.
    assert_eq!(map.keys().next().map(ShuttleId::as_str), Some("s1"));
}

#[test]
fn serde_is_transparent() {
    let id = ShuttleId::new("s1");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"s1\"");
    let back: ShuttleId = serde_json::from_str("\"temp_shuttle_10_0_0_9\"").unwrap();
    assert!(back.is_temp());
}
