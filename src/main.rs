//! review-relay binary entrypoint.
//! Wires the target store, one registry watcher per feed kind, the outbound
//! sender and the ops HTTP server.

use std::sync::Arc;

use anyhow::{Context, Result};
use review_relay::config::load_config_default;
use review_relay::ingest::providers::feed_source;
use review_relay::metrics::Metrics;
use review_relay::notify::telegram::TelegramSink;
use review_relay::notify::{self, run_sender};
use review_relay::registry::store::{JsonFileStore, TargetStore};
use review_relay::{ChangeNotifier, FeedKind, Reconciler, Registry, RegistryWatcher};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `LOG_FORMAT=json` switches to JSON lines; compact text otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("review_relay=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = load_config_default()?;
    let metrics = Metrics::init()?;

    let store: Arc<dyn TargetStore> = Arc::new(
        JsonFileStore::open(&cfg.store_path)
            .await
            .with_context(|| format!("opening target store {}", cfg.store_path.display()))?,
    );
    let notifier = Arc::new(ChangeNotifier::new());
    let registry = Registry::new(store.clone(), notifier.clone());

    let (outbox, outbox_rx) = notify::channel(cfg.outbox_capacity);
    let client = reqwest::Client::builder()
        .timeout(cfg.http_timeout())
        .build()
        .context("building http client")?;

    match cfg.telegram.bot_token.clone() {
        Some(token) => {
            let sink = TelegramSink::new(token)
                .with_api_base(cfg.telegram.api_base.as_str())
                .with_client(client.clone())
                .with_timeout(cfg.http_timeout());
            tokio::spawn(run_sender(outbox_rx, sink, registry.clone()));
        }
        None => {
            warn!("no telegram bot token configured; outbound messages are only logged");
            tokio::spawn(run_sender(outbox_rx, notify::LogSink, registry.clone()));
        }
    }

    for kind in FeedKind::ALL {
        let source = feed_source(kind, &cfg, client.clone());
        let reconciler = Reconciler::new(source, store.clone(), outbox.clone());
        let watcher = RegistryWatcher::new(kind, store.clone(), reconciler)
            .with_period(cfg.poll_interval());
        tokio::spawn(watcher.run(notifier.subscribe()));
    }
    drop(outbox);
    // Initial build of every watcher's job set.
    notifier.notify();

    let listener = tokio::net::TcpListener::bind(&cfg.ops_addr)
        .await
        .with_context(|| format!("binding ops listener on {}", cfg.ops_addr))?;
    info!(addr = %cfg.ops_addr, "review relay started");

    axum::serve(listener, metrics.router())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("ops server")?;

    info!("review relay stopped");
    Ok(())
}
