// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end gateway scenarios over loopback TCP.
//!
//! Each test assembles a real gateway (listener, workers, monitor,
//! snapshot loops) against a scripted fake shuttle and drives the literal
//! wire traffic from the protocol contract.

use sg_core::{CommandKind, ShuttleCommand, ShuttleId, ShuttleStatus, SystemClock};
use sg_gateway::config::ShuttleEndpoint;
use sg_gateway::{GatewayConfig, GatewayContext, SubmitError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// A scripted shuttle on the other end of the command link: records every
/// line the gateway writes and can speak back on the same connection.
struct FakeShuttle {
    port: u16,
    received: Arc<parking_lot::Mutex<Vec<String>>>,
    writer: Arc<tokio::sync::Mutex<Option<tokio::net::tcp::OwnedWriteHalf>>>,
}

impl FakeShuttle {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let writer = Arc::new(tokio::sync::Mutex::new(None));

        let sink = Arc::clone(&received);
        let writer_slot = Arc::clone(&writer);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let (read_half, write_half) = stream.into_split();
                *writer_slot.lock().await = Some(write_half);
                let sink = Arc::clone(&sink);
                tokio::spawn(async move {
                    let mut reader = BufReader::new(read_half);
                    let mut line = String::new();
                    while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                        sink.lock().push(line.trim().to_string());
                        line.clear();
                    }
                });
            }
        });
        Self { port, received, writer }
    }

    fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    async fn send(&self, line: &str) {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().expect("no link from the gateway yet");
        writer.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    async fn wait_for_line(&self, wanted: &str) {
        for _ in 0..250 {
            if self.received.lock().iter().any(|l| l == wanted) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("never saw {wanted:?}; got {:?}", self.received());
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

struct Harness {
    ctx: Arc<GatewayContext<SystemClock>>,
    shuttle: FakeShuttle,
    _state_dir: tempfile::TempDir,
}

async fn start_gateway(tune: impl FnOnce(&mut GatewayConfig)) -> Harness {
    let shuttle = FakeShuttle::start().await;
    let state_dir = tempfile::tempdir().unwrap();

    let mut config = GatewayConfig::default();
    config.state_dir = state_dir.path().to_path_buf();
    config.shuttle_listener_port = 0;
    config.tcp_connect_timeout = 1.0;
    config.tcp_write_timeout = 1.0;
    config.shuttles.insert(
        ShuttleId::new("s1"),
        ShuttleEndpoint::new("127.0.0.1").command_port(shuttle.port),
    );
    config
        .stock_to_shuttle
        .insert("main".to_string(), vec![ShuttleId::new("s1")]);
    tune(&mut config);

    let ctx = GatewayContext::start(config, SystemClock).await.unwrap();
    Harness { ctx, shuttle, _state_dir: state_dir }
}

impl Harness {
    fn status(&self) -> ShuttleStatus {
        self.ctx.engine().status_of(&ShuttleId::new("s1"))
    }

    fn current_command(&self) -> Option<String> {
        self.ctx
            .engine()
            .state(&ShuttleId::new("s1"))
            .unwrap()
            .lock()
            .current_command
            .clone()
    }

    /// Open the command link and put the shuttle into FREE.
    async fn bring_online(&self) {
        self.ctx
            .submit(ShuttleCommand::new(CommandKind::Status, "s1"))
            .await
            .unwrap();
        self.shuttle.wait_for_line("STATUS").await;
        self.shuttle.send("STATUS=FREE").await;
        wait_until(|| self.status() == ShuttleStatus::Free, "shuttle FREE").await;
    }
}

// Scenario A: a full loading cycle with the literal wire traffic.
#[tokio::test]
async fn scenario_a_loading_cycle() {
    let h = start_gateway(|_| {}).await;
    h.bring_online().await;

    let command = ShuttleCommand::new(CommandKind::PalletIn, "s1")
        .params("A1")
        .external_id("ext-1")
        .stock_name("main");
    h.ctx.submit(command).await.unwrap();

    h.shuttle.wait_for_line("PALLET_IN-A1").await;
    wait_until(|| h.status() == ShuttleStatus::Busy, "BUSY after send").await;
    assert_eq!(h.current_command().as_deref(), Some("PALLET_IN-A1"));

    h.shuttle.send("PALLET_IN_STARTED").await;
    wait_until(|| h.status() == ShuttleStatus::Loading, "LOADING after STARTED").await;

    h.shuttle.send("PALLET_IN_DONE").await;
    wait_until(|| h.status() == ShuttleStatus::Free, "FREE after DONE").await;
    assert_eq!(h.current_command(), None);

    // Two unsolicited reports → exactly two MRCD acks on the link.
    wait_until(
        || {
            h.shuttle
                .received()
                .iter()
                .filter(|l| l.as_str() == "MRCD")
                .count()
                >= 3
        },
        "acks",
    )
    .await;
    let received = h.shuttle.received();
    // STATUS=FREE, PALLET_IN_STARTED and PALLET_IN_DONE each earned one.
    assert_eq!(received.iter().filter(|l| l.as_str() == "MRCD").count(), 3);

    h.ctx.shutdown().await;
}

// Scenario B: FIFO parameters are zero-padded to three digits.
#[tokio::test]
async fn scenario_b_fifo_param_padding() {
    let h = start_gateway(|_| {}).await;
    h.bring_online().await;

    let command = ShuttleCommand::new(CommandKind::Fifo, "s1").params("7");
    let expected = sg_wire::encode_command(&command);
    assert_eq!(expected, "FIFO-007");

    h.ctx.submit(command).await.unwrap();
    h.shuttle.wait_for_line("FIFO-007").await;

    h.ctx.shutdown().await;
}

// Scenario C: a low battery report flips the status.
#[tokio::test]
async fn scenario_c_low_battery() {
    let h = start_gateway(|_| {}).await;
    h.bring_online().await;

    h.shuttle.send("BATTERY=<15%").await;
    wait_until(|| h.status() == ShuttleStatus::LowBattery, "LOW_BATTERY").await;

    let view = h.ctx.status_view();
    let entry = view.get(&ShuttleId::new("s1")).unwrap();
    assert_eq!(entry.battery_level.as_deref(), Some("<15%"));
    assert_eq!(
        serde_json::to_value(entry).unwrap()["status"],
        "LOW_BATTERY"
    );

    h.ctx.shutdown().await;
}

// Scenario D: HOME preempts queued work on a busy shuttle.
#[tokio::test]
async fn scenario_d_preemptive_home() {
    let h = start_gateway(|_| {}).await;
    h.bring_online().await;

    h.shuttle.send("STATUS=CARGO").await;
    wait_until(|| h.status() == ShuttleStatus::Busy, "BUSY").await;

    h.ctx
        .submit(ShuttleCommand::new(CommandKind::PalletIn, "s1").params("B2"))
        .await
        .unwrap();
    h.ctx.submit(ShuttleCommand::new(CommandKind::Home, "s1")).await.unwrap();

    h.shuttle.wait_for_line("HOME").await;
    let received = h.shuttle.received();
    assert!(
        !received.iter().any(|l| l == "PALLET_IN-B2"),
        "queued command beat HOME: {received:?}"
    );

    // Free the shuttle; the queued command follows.
    h.shuttle.send("STATUS=FREE").await;
    h.shuttle.wait_for_line("PALLET_IN-B2").await;
    let received = h.shuttle.received();
    let home_at = received.iter().position(|l| l == "HOME").unwrap();
    let pallet_at = received.iter().position(|l| l == "PALLET_IN-B2").unwrap();
    assert!(home_at < pallet_at);

    h.ctx.shutdown().await;
}

// Scenario E: a full queue rejects submission synchronously.
#[tokio::test]
async fn scenario_e_queue_full() {
    let h = start_gateway(|config| config.command_queue_max_size = 2).await;
    // Shuttle stays UNKNOWN: workers leave the queue alone.

    h.ctx
        .submit(ShuttleCommand::new(CommandKind::PalletIn, "s1").params("A1"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    h.ctx
        .submit(ShuttleCommand::new(CommandKind::PalletIn, "s1").params("A2"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;

    let err = h
        .ctx
        .submit(ShuttleCommand::new(CommandKind::PalletIn, "s1").params("A3"))
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::QueueFull(_)));

    h.ctx.shutdown().await;
}

// Scenario F: an inbound connection is identified by source IP and the
// link is reused for outbound traffic instead of redialling.
#[tokio::test]
async fn scenario_f_inbound_identity() {
    // Command port deliberately dead: any redial would fail loudly.
    let dead_port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let state_dir = tempfile::tempdir().unwrap();
    let mut config = GatewayConfig::default();
    config.state_dir = state_dir.path().to_path_buf();
    config.shuttle_listener_port = 0;
    config.tcp_connect_timeout = 1.0;
    config.shuttles.insert(
        ShuttleId::new("s1"),
        ShuttleEndpoint::new("127.0.0.1").command_port(dead_port),
    );
    let ctx = GatewayContext::start(config, SystemClock).await.unwrap();

    // The shuttle dials in from its configured address.
    let stream = tokio::net::TcpStream::connect(("127.0.0.1", ctx.listener_addr().port()))
        .await
        .unwrap();
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(b"STATUS=FREE\n").await.unwrap();

    let engine = Arc::clone(ctx.engine());
    wait_until(
        || engine.status_of(&ShuttleId::new("s1")) == ShuttleStatus::Free,
        "inbound line processed",
    )
    .await;

    // Outbound dispatch reuses the inbound link.
    ctx.submit(ShuttleCommand::new(CommandKind::Status, "s1")).await.unwrap();

    let mut reader = BufReader::new(read_half);
    let mut lines = Vec::new();
    let mut line = String::new();
    for _ in 0..2 {
        line.clear();
        tokio::time::timeout(Duration::from_secs(5), reader.read_line(&mut line))
            .await
            .unwrap()
            .unwrap();
        lines.push(line.trim().to_string());
    }
    // The MRCD ack for STATUS=FREE, then the reused-link STATUS command.
    assert_eq!(lines, vec!["MRCD", "STATUS"]);

    ctx.shutdown().await;
}
