//! Status monitor binary entrypoint.
//! Loads provider config, starts one polling task per feed, prints new
//! status events, and serves `/health`, `/events` and `/metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use status_watch::api::{self, AppState};
use status_watch::history::EventHistory;
use status_watch::ingest::config::load_config_default;
use status_watch::ingest::{HttpFetcher, StatusEvent, StatusMonitor};
use status_watch::metrics::Metrics;

/// Compact human logs by default; JSON lines when STATUS_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("status_watch=info,ingest=info,warn"));

    let json = std::env::var("STATUS_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn bind_addr() -> Result<SocketAddr> {
    if let Ok(addr) = std::env::var("HTTP_BIND") {
        return addr.parse().with_context(|| format!("HTTP_BIND={addr}"));
    }
    let port: u16 = match std::env::var("PORT") {
        Ok(p) => p.parse().with_context(|| format!("PORT={p}"))?,
        Err(_) => 8000,
    };
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}

/// Console side of the sink: print and keep for `/events`.
async fn consume_events(mut rx: mpsc::UnboundedReceiver<StatusEvent>, history: Arc<EventHistory>) {
    while let Some(ev) = rx.recv().await {
        println!("{ev}\n");
        history.push(ev);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let metrics = Metrics::init()?;
    let config = load_config_default().context("loading provider config")?;
    if config.providers.is_empty() {
        bail!("no providers configured");
    }

    let fetcher = HttpFetcher::with_user_agent(config.fetch_timeout(), &config.settings.user_agent)?;
    let monitor = StatusMonitor::with_backoff(
        config.providers.clone(),
        Arc::new(fetcher),
        config.settings.backoff,
    );
    if monitor.is_empty() {
        bail!("every configured provider was rejected");
    }

    let history = Arc::new(EventHistory::with_capacity(config.settings.history_capacity));
    let (tx, rx) = mpsc::unbounded_channel();
    let token = CancellationToken::new();

    let consumer = tokio::spawn(consume_events(rx, history.clone()));
    let monitor_task = monitor.spawn(tx, token.clone());

    let app = api::router(AppState::new(history)).merge(metrics.router());
    let addr = bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "http server listening");

    let shutdown = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await
        .context("http server")?;

    token.cancel();
    monitor_task.await.context("monitor task")?;
    consumer.await.context("event consumer")?;
    Ok(())
}
