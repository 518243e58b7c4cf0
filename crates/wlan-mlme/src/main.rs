//! wlan-mlmed: the MLME engine as a standalone daemon.
//!
//! Loads the TOML configuration, starts the engine's event loop on a
//! loopback radio, optionally brings up the BSS described by the `[ap]`
//! table, and runs until Ctrl+C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config_from()      -- defaults when the file is absent
//!  └─ MlmeRuntime::new()      -- tokio timers, scanner, radio worker
//!       ├─ RadioWorker        (Tokio task, LoopbackTransport)
//!       └─ MlmeRuntime::run   (Tokio task, owns the MlmeContext)
//!  └─ SME indication pump     (Tokio task, logs every indication)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wlan_mlme::application::events::SmeRequest;
use wlan_mlme::infrastructure::radio::LoopbackTransport;
use wlan_mlme::infrastructure::runtime::{MlmeRuntime, RuntimeOptions};
use wlan_mlme::infrastructure::storage::config::{self, MlmeConfig};
use wlan_mlme::infrastructure::upstream::ChannelSink;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// 802.11 MLME connection engine daemon.
#[derive(Debug, Parser)]
#[command(name = "wlan-mlmed", about = "802.11 MLME connection engine", version)]
struct Cli {
    /// Configuration file.  Defaults to the platform config directory.
    #[arg(long, short, env = "WLAN_MLME_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset.  Overrides the config file.
    #[arg(long, env = "WLAN_MLME_LOG")]
    log_level: Option<String>,

    /// Write the effective configuration to the config path and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    fn config_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::config_file_path().context("no --config given and no platform config directory"),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.config_path()?;
    let cfg: MlmeConfig =
        config::load_config_from(&path).with_context(|| format!("loading config from {}", path.display()))?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the CLI flag, then the config file.
    let level = cli.log_level.clone().unwrap_or_else(|| cfg.daemon.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)))
        .init();

    if cli.write_config {
        config::save_config_to(&path, &cfg).with_context(|| format!("writing config to {}", path.display()))?;
        info!(path = %path.display(), "configuration written");
        return Ok(());
    }

    info!(config = %path.display(), "wlan-mlmed starting");

    // ── Engine ────────────────────────────────────────────────────────────────
    let options = RuntimeOptions {
        event_queue_depth: cfg.daemon.event_queue_depth,
        tx_buffers: cfg.daemon.tx_buffers,
    };
    let (sink, mut indications) = ChannelSink::new();
    let (runtime, handle) = MlmeRuntime::new(
        cfg.engine_config(),
        options,
        Arc::new(LoopbackTransport::new()),
        Arc::new(sink),
    );
    let engine = tokio::spawn(runtime.run());

    // ── SME indication pump ───────────────────────────────────────────────────
    tokio::spawn(async move {
        while let Some(indication) = indications.recv().await {
            info!(?indication, "SME indication");
        }
    });

    // ── Optional BSS ──────────────────────────────────────────────────────────
    if let Some(ap) = &cfg.ap {
        let params = ap.start_params()?;
        info!(bssid = %params.bssid, ssid = %ap.ssid, channel = params.channel, "starting BSS");
        handle.submit(SmeRequest::StartBss(params)).await?;
    }

    // ── Ctrl-C ────────────────────────────────────────────────────────────────
    info!("wlan-mlmed ready.  Press Ctrl-C to exit.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for Ctrl+C signal: {e}");
    }
    info!("shutdown signal received");
    handle.shutdown().await?;
    let handled = engine.await.context("engine task panicked")?;

    info!(events = handled, "wlan-mlmed stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
