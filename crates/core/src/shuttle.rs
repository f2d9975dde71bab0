// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shuttle identity.
//!
//! Configured shuttles carry stable IDs assigned in the config file. A
//! peer dialing in from an address that matches no configured shuttle is
//! minted a synthetic `temp_shuttle_<ip>` identity: it is acknowledged on
//! the wire but never gets a state record or a command queue. Loopback
//! peers may instead fall back to a `virtual*` simulator shuttle.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::net::IpAddr;

/// Prefix of identities minted for unconfigured peers.
const TEMP_PREFIX: &str = "temp_shuttle_";

/// Prefix naming simulator shuttles.
const VIRTUAL_PREFIX: &str = "virtual";

/// Identity of a shuttle, configured or minted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShuttleId(String);

impl ShuttleId {
    /// A configured identity, taken verbatim.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint the synthetic identity for an unconfigured peer address:
    /// `temp_shuttle_<ip>`, with the address separators flattened to `_`
    /// so the ID stays safe in log lines and store keys.
    pub fn temp_for_ip(ip: IpAddr) -> Self {
        Self(format!("{TEMP_PREFIX}{}", ip.to_string().replace(['.', ':'], "_")))
    }

    /// Whether this identity was minted rather than configured.
    pub fn is_temp(&self) -> bool {
        self.0.starts_with(TEMP_PREFIX)
    }

    /// Whether this names a simulator shuttle.
    pub fn is_virtual(&self) -> bool {
        self.0.starts_with(VIRTUAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShuttleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ShuttleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ShuttleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<&str> for ShuttleId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// Lets `BTreeMap<ShuttleId, _>` look ups take plain `&str` keys.
impl Borrow<str> for ShuttleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "shuttle_tests.rs"]
mod tests;
