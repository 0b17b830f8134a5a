//! renku-notify - RenkuLab notification channel client
//!
//! Connects to the UI server's WebSocket endpoint and keeps the connection
//! alive, logging session-status, version and knowledge-graph activation
//! updates as they arrive.

use anyhow::Context;
use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use renku_notify::{
    config::{self, ChannelConfig},
    ClientStore, NotificationChannel, TracingNotifier,
};

/// renku-notify - RenkuLab notification channel client
#[derive(ClapParser, Debug)]
#[command(name = "renku-notify", version, about, long_about = None)]
struct Cli {
    /// WebSocket endpoint (ws:// or wss://)
    #[arg(long, env = "RENKU_NOTIFY_URL", conflicts_with = "ui_server")]
    url: Option<String>,

    /// UI server base URL; the endpoint is derived as <base>/ws
    #[arg(long, env = "RENKU_UI_SERVER")]
    ui_server: Option<String>,

    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep-alive interval in milliseconds (0 disables pinging)
    #[arg(long)]
    ping_interval_ms: Option<u64>,

    /// Project id of a knowledge-graph activation still in progress
    #[arg(long = "track-activation", value_name = "PROJECT_ID")]
    track_activation: Vec<u64>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "renku_notify=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn resolve_config(cli: &Cli) -> anyhow::Result<ChannelConfig> {
    let path = cli.config.clone().or_else(config::default_config_path);
    let mut config = match path {
        Some(path) => ChannelConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?
            .unwrap_or_default(),
        None => ChannelConfig::default(),
    };

    if let Some(url) = &cli.url {
        config.url = Some(url.clone());
    } else if let Some(base) = &cli.ui_server {
        config.url = Some(config::websocket_url_from_uiserver(base)?);
    }
    if let Some(ms) = cli.ping_interval_ms {
        config.ping_interval_ms = ms;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = resolve_config(&cli)?;

    let store = ClientStore::new();
    for project_id in &cli.track_activation {
        store.track_activation(*project_id);
    }

    let mut handle = NotificationChannel::new(config)
        .store(store)
        .notifier(Arc::new(TracingNotifier))
        .spawn()?;
    tracing::info!(url = %handle.url(), "notification channel starting");

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = handle.finished() => false,
    };
    if interrupted {
        tracing::info!("interrupted, closing notification channel");
        handle.shutdown();
    }
    handle.join().await;
    Ok(())
}
