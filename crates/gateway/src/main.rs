// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sgd: the WMS↔shuttle gateway daemon.

use anyhow::Context as _;
use sg_gateway::{GatewayConfig, GatewayContext};
use sg_core::SystemClock;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_args() -> anyhow::Result<Option<PathBuf>> {
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let value = args.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                println!("usage: sgd [--config <path>]");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(config_path)
}

/// Install the subscriber. `RUST_LOG` wins over the configured level; the
/// returned guard keeps the file writer flushing until exit.
fn init_tracing(
    config: &GatewayConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    match &config.logging.file_path {
        Some(path) => {
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file = path.file_name().context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(None)
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = parse_args()?;
    let config = GatewayConfig::load(config_path.as_deref())
        .context("failed to load configuration")?;
    let _log_guard = init_tracing(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting WMS↔shuttle gateway");
    let ctx = GatewayContext::start(config, SystemClock)
        .await
        .context("gateway startup failed")?;

    wait_for_shutdown_signal().await;
    ctx.shutdown().await;
    Ok(())
}
