// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ShuttleEndpoint;
use sg_core::{FakeClock, ShuttleStatus};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use yare::parameterized;

fn config_with(hosts: &[(&str, &str)]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for (id, host) in hosts {
        config.shuttles.insert(ShuttleId::new(*id), ShuttleEndpoint::new(*host));
    }
    config
}

#[test]
fn exact_host_match_wins() {
    let config = config_with(&[("s1", "10.0.0.42"), ("s2", "10.0.0.43")]);
    let id = resolve_shuttle_id(&config, "10.0.0.43".parse().unwrap());
    assert_eq!(id, ShuttleId::new("s2"));
}

#[test]
fn loopback_falls_back_to_configured_loopback_shuttle() {
    let config = config_with(&[("s1", "10.0.0.42"), ("local", "127.0.0.1")]);
    let id = resolve_shuttle_id(&config, "127.0.0.1".parse().unwrap());
    assert_eq!(id, ShuttleId::new("local"));
}

#[test]
fn loopback_falls_back_to_virtual_shuttle() {
    let config = config_with(&[("s1", "10.0.0.42"), ("virtual1", "10.0.0.99")]);
    let id = resolve_shuttle_id(&config, "127.0.0.1".parse().unwrap());
    assert_eq!(id, ShuttleId::new("virtual1"));
}

#[parameterized(
    ipv4 = { "10.9.8.7", "temp_shuttle_10_9_8_7" },
    ipv6 = { "2001:db8::7", "temp_shuttle_2001_db8__7" },
)]
fn unknown_peer_gets_a_temp_identity(ip: &str, expected: &str) {
    let config = config_with(&[("s1", "10.0.0.42")]);
    let id = resolve_shuttle_id(&config, ip.parse().unwrap());
    assert_eq!(id, ShuttleId::new(expected));
}

/// Scenario F: an inbound link is installed under the shuttle's identity
/// and later writes reuse it instead of redialling.
#[tokio::test]
async fn inbound_link_is_registered_and_reused() {
    let config = Arc::new(config_with(&[("s1", "127.0.0.1")]));
    let clock = FakeClock::new();
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(StateEngine::new(
        [ShuttleId::new("s1")],
        HashMap::new(),
        Arc::clone(&registry),
        clock.clone(),
        config.write_timeout(),
    ));
    let token = CancellationToken::new();

    let mut bind_config = (*config).clone();
    bind_config.shuttle_listener_port = 0;
    let tcp = ShuttleListener::<FakeClock>::bind(&bind_config).await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let listener = Arc::new(ShuttleListener::new(
        Arc::clone(&engine),
        Arc::clone(&registry),
        config,
        clock,
        token.clone(),
    ));
    tokio::spawn(Arc::clone(&listener).run(tcp));

    // The "shuttle" dials in and reports free.
    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
    stream.write_all(b"STATUS=FREE\n").await.unwrap();

    // Wait until the line has been processed.
    let s1 = ShuttleId::new("s1");
    for _ in 0..100 {
        if engine.status_of(&s1) == ShuttleStatus::Free {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(engine.status_of(&s1), ShuttleStatus::Free);
    assert!(registry.is_connected(&s1).await);
    assert!(registry.is_inbound(&s1).await);

    // The ack came back on the same link.
    let (read_half, _write_half) = stream.into_split();
    let mut reader = tokio::io::BufReader::new(read_half);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line.trim(), "MRCD");

    // A direct send reuses the inbound link rather than dialling the
    // (nonexistent) command port.
    registry
        .send_line(&s1, "STATUS", std::time::Duration::from_millis(200))
        .await
        .unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line.trim(), "STATUS");

    token.cancel();
}

#[tokio::test]
async fn disconnect_removes_the_registry_entry() {
    let config = Arc::new(config_with(&[("s1", "127.0.0.1")]));
    let clock = FakeClock::new();
    let registry = Arc::new(ConnectionRegistry::new());
    let engine = Arc::new(StateEngine::new(
        [ShuttleId::new("s1")],
        HashMap::new(),
        Arc::clone(&registry),
        clock.clone(),
        config.write_timeout(),
    ));
    let token = CancellationToken::new();

    let mut bind_config = (*config).clone();
    bind_config.shuttle_listener_port = 0;
    let tcp = ShuttleListener::<FakeClock>::bind(&bind_config).await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let listener = Arc::new(ShuttleListener::new(
        engine,
        Arc::clone(&registry),
        config,
        clock,
        token.clone(),
    ));
    tokio::spawn(Arc::clone(&listener).run(tcp));

    let s1 = ShuttleId::new("s1");
    let stream = tokio::net::TcpStream::connect(("127.0.0.1", addr.port())).await.unwrap();
    for _ in 0..100 {
        if registry.is_connected(&s1).await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(registry.is_connected(&s1).await);

    drop(stream);
    for _ in 0..100 {
        if !registry.is_connected(&s1).await {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!registry.is_connected(&s1).await);

    token.cancel();
}
