// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shuttle wire protocol: LF-framed ASCII lines over TCP.
//!
//! Commands flow gateway → shuttle as `<TYPE>` or `<TYPE>-<PARAM>` lines;
//! status messages flow shuttle → gateway and are decoded into [`Message`].
//! Every non-MRCD shuttle line is acknowledged with `MRCD`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod message;

pub use codec::{encode_command, read_line, write_line, FrameError, MRCD_LINE, PING_LINE};
pub use message::{battery_percent, map_reported_status, Message};
