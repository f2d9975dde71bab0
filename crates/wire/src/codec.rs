// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! LF framing and command encoding.
//!
//! Lines end with `\n`. Reads and writes each carry their own timeout so a
//! stalled shuttle cannot wedge a reader fiber or the dispatcher.

use sg_core::{CommandKind, ShuttleCommand};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// The acknowledgement token, sent in reply to every non-MRCD line.
pub const MRCD_LINE: &str = "MRCD";

/// Probe sent when an inbound link has been silent past the read timeout.
pub const PING_LINE: &str = "PING";

/// Errors from the line codec.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed")]
    Eof,

    #[error("timed out")]
    Timeout,

    #[error("frame is not valid utf-8")]
    Utf8,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one LF-terminated line, decoded and trimmed, within `timeout`.
///
/// A clean EOF (zero bytes) is [`FrameError::Eof`]; a partial line at EOF
/// is returned as-is, matching what the device sends on abrupt close.
pub async fn read_line<R>(reader: &mut R, timeout: Duration) -> Result<String, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = tokio::time::timeout(timeout, reader.read_until(b'\n', &mut buf))
        .await
        .map_err(|_| FrameError::Timeout)??;
    if n == 0 {
        return Err(FrameError::Eof);
    }
    let line = String::from_utf8(buf).map_err(|_| FrameError::Utf8)?;
    Ok(line.trim().to_string())
}

/// Write `line` with a trailing LF (appended when missing) and flush,
/// within `timeout`.
pub async fn write_line<W>(writer: &mut W, line: &str, timeout: Duration) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = if line.ends_with('\n') { line.to_string() } else { format!("{line}\n") };
    tokio::time::timeout(timeout, async {
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| FrameError::Timeout)??;
    Ok(())
}

/// Render a command to its wire line (no trailing LF).
///
/// FIFO/FILO integer parameters are zero-padded to three digits
/// (`FIFO-007`); non-integer parameters render literally.
pub fn encode_command(command: &ShuttleCommand) -> String {
    match &command.params {
        Some(params) if matches!(command.kind, CommandKind::Fifo | CommandKind::Filo) => {
            match params.trim().parse::<u64>() {
                Ok(row) => format!("{}-{:03}", command.kind, row),
                Err(_) => format!("{}-{}", command.kind, params),
            }
        }
        Some(params) => format!("{}-{}", command.kind, params),
        None => command.kind.to_string(),
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
