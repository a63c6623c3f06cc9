//! Kiosk display binary: the unattended on-site process that polls the
//! session server, routes scanner input, and drives the streaming encoder.

use std::{env, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rip_kiosk_back::{
    display::{DEFAULT_POLL_INTERVAL, DisplayClient, FileRecoveryStore, HttpSessionApi},
    encoder::{EncoderConfig, EncoderManager, WsEncoderTransport},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let server_url =
        env::var("KIOSK_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let location_slug =
        env::var("KIOSK_LOCATION_SLUG").context("KIOSK_LOCATION_SLUG must name this kiosk")?;
    let state_dir = env::var("KIOSK_STATE_DIR").unwrap_or_else(|_| "state".into());
    let poll_interval = env::var("KIOSK_POLL_INTERVAL_SECONDS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_POLL_INTERVAL);

    let api = HttpSessionApi::new(&server_url)?;
    let encoder = EncoderManager::new(
        Arc::new(WsEncoderTransport::new()),
        EncoderConfig::from_env(),
    );

    if encoder.is_enabled() {
        match encoder.connect().await {
            Ok(()) => {
                if let Err(err) = encoder.apply_configured_stream_settings().await {
                    warn!(error = %err, "failed to apply stream settings");
                }
            }
            Err(err) => {
                warn!(error = %err, "encoder not reachable at startup; will keep retrying");
            }
        }
    } else {
        info!("no encoder configured; running display without stream control");
    }

    let recovery = FileRecoveryStore::new(state_dir);
    let client = DisplayClient::new(
        Arc::new(api),
        encoder,
        Arc::new(recovery),
        location_slug.clone(),
        poll_interval,
    );

    // Scanner wedges type into the foreground process: codes arrive as
    // plain lines on stdin.
    let (scan_tx, scan_rx) = mpsc::channel(16);
    tokio::spawn(read_scanner_lines(scan_tx));

    info!(%server_url, %location_slug, "kiosk display starting");
    client.run(scan_rx).await;
    Ok(())
}

/// Forward scanner lines into the display loop until stdin closes.
async fn read_scanner_lines(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "failed to read scanner input");
                break;
            }
        }
    }
}

/// Configure tracing subscribers for the display process.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
