// Scoreboard bridge entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file)
// 2. Load config
// 3. Resolve the static catalog version
// 4. Create mpsc channels
// 5. Build host, event bus, live client and reconciler
// 6. Spawn WebSocket server task
// 7. Run the app loop until it ends or Ctrl+C
// 8. Cleanup on exit

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use directories::ProjectDirs;
use scoreboard_app::events::{ChannelSink, EventBus};
use scoreboard_app::host::WsHost;
use scoreboard_app::live_client::LiveClientHttp;
use scoreboard_app::reconciler::Reconciler;
use scoreboard_app::{app, catalog};
use scoreboard_core::config;
use scoreboard_core::protocol::Topic;
use scoreboard_core::ws_server;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Scoreboard bridge starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: polling game {} every {:?} from {}",
        config.games.polling_target,
        config.live_client.poll_interval(),
        config.live_client.url
    );

    // 3. Resolve catalog version (falls back, never fails)
    let http = reqwest::Client::new();
    let catalog_version = catalog::resolve_catalog_version(
        &http,
        &config.catalog.versions_url,
        &config.catalog.fallback_version,
    )
    .await;

    // 4. Create mpsc channels
    let (ws_tx, ws_rx) = mpsc::channel(256);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (poll_tx, poll_rx) = mpsc::channel(64);

    // 5. Host, bus, live client, reconciler
    let host = Arc::new(WsHost::new(out_tx.clone()));

    let mut bus = EventBus::new();
    bus.subscribe(&Topic::ALL, Arc::new(ChannelSink::new(out_tx)));

    let source = Arc::new(
        LiveClientHttp::new(config.live_client.url.clone())
            .context("failed to build live client")?,
    );

    let reconciler = Reconciler::new(&config, host.clone(), bus, source, poll_tx)
        .with_catalog_version(catalog_version);

    // 6. Spawn WebSocket server task
    let ws_port = config.ws_port;
    let ws_handle = tokio::spawn(async move {
        match ws_server::bind(ws_port).await {
            Ok(listener) => {
                if let Err(e) = ws_server::run(listener, ws_tx, out_rx).await {
                    error!("WebSocket server error: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to bind WebSocket server on port {}: {}", ws_port, e);
            }
        }
    });

    info!("Bridge ready. WebSocket server listening on 127.0.0.1:{}", ws_port);

    // 7. Run until the app loop ends or the user interrupts
    tokio::select! {
        result = app::run(ws_rx, poll_rx, reconciler, host) => {
            if let Err(e) = result {
                error!("Application loop error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, shutting down");
        }
    }

    // 8. Cleanup
    ws_handle.abort();

    info!("Scoreboard bridge shut down cleanly");
    Ok(())
}

/// Per-user log directory, or `./logs` when no home directory is known.
fn log_dir() -> anyhow::Result<PathBuf> {
    match ProjectDirs::from("gg", "scoreboard", "scoreboard-bridge") {
        Some(dirs) => Ok(dirs.data_local_dir().join("logs")),
        None => Ok(std::env::current_dir()?.join("logs")),
    }
}

/// Initialize tracing to log to a file; the bridge has no terminal of its own.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_file = std::fs::File::create(log_dir.join("scoreboard-bridge.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("scoreboard_app=info,scoreboard_core=info,warn")
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
