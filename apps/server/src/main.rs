//! camrelay-server - standalone headless server for camrelay.
//!
//! Accepts camera connections over TCP, decodes H.264/AAC, and republishes
//! the result through the configured publisher. This binary is a thin CLI
//! wrapper around `camrelay-core`'s supervisor; the core itself never reads
//! argv or environment variables directly.

mod config;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use camrelay_core::{HostCallbacks, HostEvent, Hooks, PublisherKind, Supervisor};
use clap::{Parser, ValueEnum};
use tokio::signal;

use crate::config::{QualitySpec, ServerConfig};

/// camrelay-server - headless camera ingest/decode/republish server.
#[derive(Parser, Debug)]
#[command(name = "camrelay-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, env = "CAMRELAY_LOG_LEVEL")]
    log_level: Option<log::LevelFilter>,

    /// Bind IP address (overrides config file and auto-detection).
    #[arg(long, env = "CAMRELAY_BIND_IP")]
    bind_ip: Option<Ipv4Addr>,

    /// Number of default cameras to run when no explicit stream list is configured.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=8))]
    camera_count: Option<u32>,

    /// Publisher implementation.
    #[arg(long, value_enum)]
    publisher: Option<PublisherArg>,

    /// Path to the native republishing shared library (required when `--publisher native`).
    #[arg(long, value_name = "FILE")]
    native_library_path: Option<PathBuf>,

    /// Initial republish quality.
    #[arg(long, value_enum)]
    quality: Option<QualityArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PublisherArg {
    Native,
    Passthrough,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QualityArg {
    Low,
    Medium,
    High,
}

impl From<QualityArg> for QualitySpec {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Low => QualitySpec::Low,
            QualityArg::Medium => QualitySpec::Medium,
            QualityArg::High => QualitySpec::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging. This is the only place in the whole process a
    // concrete logger is installed; camrelay-core only ever calls the
    // `log` facade.
    env_logger::Builder::new()
        .filter_level(args.log_level.unwrap_or(log::LevelFilter::Info))
        .format_timestamp_millis()
        .init();

    log::info!("camrelay-server v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ServerConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    // CLI flags are the final override layer, on top of file and environment.
    if let Some(bind_ip) = args.bind_ip {
        config.bind_ip = Some(bind_ip);
    }
    if let Some(camera_count) = args.camera_count {
        config.camera_count = camera_count;
    }
    if let Some(publisher) = args.publisher {
        config.publisher_kind = match publisher {
            PublisherArg::Native => PublisherKind::Native,
            PublisherArg::Passthrough => PublisherKind::Passthrough,
        };
    }
    if let Some(path) = args.native_library_path {
        config.native_library_path = Some(path);
    }
    if let Some(quality) = args.quality {
        config.initial_quality = quality.into();
    }

    if config.publisher_kind == PublisherKind::Native && config.native_library_path.is_none() {
        anyhow::bail!("--publisher native requires --native-library-path or CAMRELAY_NATIVE_LIBRARY_PATH");
    }

    let core_config = config.to_core_config();
    log::info!(
        "starting {} camera stream(s), publisher={:?}",
        core_config.streams.len(),
        config.publisher_kind
    );

    let callbacks = HostCallbacks {
        on_event: Some(std::sync::Arc::new(log_host_event)),
        on_network_status: Some(std::sync::Arc::new(log_network_status)),
    };
    let hooks = Hooks::new();

    let supervisor = Supervisor::start(core_config, callbacks, hooks)
        .await
        .context("failed to start supervisor")?;

    log::info!("supervisor running, bound to {}", supervisor.bind_ip());

    shutdown_signal().await;
    log::info!("shutdown signal received, stopping supervisor");

    let stop = supervisor.stop();
    if tokio::time::timeout(std::time::Duration::from_secs(10), stop)
        .await
        .is_err()
    {
        log::warn!("supervisor did not stop within the graceful shutdown deadline");
    }

    log::info!("shutdown complete");
    Ok(())
}

fn log_host_event(event: HostEvent) {
    match event {
        HostEvent::ConnectionChanged {
            stream_id,
            connected,
            info,
        } => {
            log::info!(
                "stream {stream_id} connection changed: connected={connected} info={info:?}"
            );
        }
        HostEvent::FrameDecoded { .. } => {}
        HostEvent::Error { message } => log::error!("{message}"),
        HostEvent::NetworkStatusChanged { available, ip } => {
            log::warn!("network status changed: available={available} ip={ip:?}");
        }
        HostEvent::ServerStopped => log::info!("server stopped"),
    }
}

fn log_network_status(available: bool, ip: Option<Ipv4Addr>) {
    log::info!("network status: available={available} ip={ip:?}");
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
