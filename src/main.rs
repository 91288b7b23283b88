use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use lighter_md::analytics::FundingAnalytics;
use lighter_md::boundary::ws::AppState;
use lighter_md::boundary::{self, health::HealthState};
use lighter_md::bus::{self, Bus};
use lighter_md::config::Settings;
use lighter_md::store::MarketStore;
use lighter_md::upstream::{self, ClientConfig};
use lighter_md::{analytics, metadata};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    init_tracing(&settings.log_level);

    tracing::info!(ws_url = %settings.ws_url, "starting lighter-md");

    let metadata = Arc::new(match &settings.metadata_path {
        Some(path) => metadata::load(path),
        None => metadata::MarketMetadata::new(),
    });

    let queue_capacity = bus::subscriber_queue_capacity(settings.ui_debounce_seconds);
    let update_bus = Arc::new(Bus::new(queue_capacity));
    let funding_bus = Arc::new(Bus::new(queue_capacity));
    let store = MarketStore::new(update_bus.clone(), settings.debounce(), metadata);
    let funding_analytics = FundingAnalytics::new();
    let connected = Arc::new(AtomicBool::new(false));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client_config = ClientConfig {
        url: url::Url::parse(&settings.ws_url)?,
        ping_interval: settings.ping_interval(),
        heartbeat_timeout: settings.heartbeat_timeout(),
        reconnect_base: std::time::Duration::from_secs_f64(settings.reconnect_base_delay_secs),
        reconnect_max: std::time::Duration::from_secs_f64(settings.reconnect_max_delay_secs),
    };

    let upstream_task = tokio::spawn(upstream::run(
        client_config,
        store.clone(),
        shutdown_rx.clone(),
        connected.clone(),
    ));

    let analytics_task = tokio::spawn(analytics::run(
        funding_analytics.clone(),
        store.clone(),
        funding_bus.clone(),
        std::time::Duration::from_secs_f64(settings.funding_refresh_seconds),
        settings.funding_min_assets,
        shutdown_rx.clone(),
    ));

    let health_state = HealthState::new(store.clone(), connected);
    let app_state = AppState {
        store: store.clone(),
        bus: update_bus,
        funding_bus,
        analytics: funding_analytics,
    };
    let router = boundary::router(health_state, app_state);
    let addr: SocketAddr = format!("{}:{}", settings.dashboard_host, settings.dashboard_port).parse()?;

    tokio::select! {
        result = boundary::serve(addr, router, shutdown_rx.clone()) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "boundary server exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(upstream_task, analytics_task);

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
