//! OddsBot - polling daemon
//!
//! Every pass: fetch all providers, resolve best lines, report arbitrage and
//! odds moves against the previous pass, then log provider health.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use oddsbot::config::AppConfig;
use oddsbot::providers::{HttpProviderClient, ProviderClient};
use oddsbot::telemetry::init_tracing;
use oddsbot::{run_until, UnifiedSportsbookService};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&cfg.logging)?;

    info!("OddsBot v{}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", cfg.digest());

    let timeout = Duration::from_millis(cfg.aggregator.provider_timeout_ms);
    let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::new();
    for endpoint in cfg.enabled_providers() {
        let client = HttpProviderClient::new(endpoint.name.as_str(), endpoint.base_url.as_str(), timeout)
            .with_context(|| format!("Failed to create client for {}", endpoint.name))?;
        providers.push(Arc::new(client));
    }
    if providers.is_empty() {
        warn!("No providers enabled, every pass will be empty");
    }

    let (sink, events) = cfg.notifications.build_sink();
    if let Some(rx) = events {
        tokio::spawn(forward_events(rx));
    }
    let service = UnifiedSportsbookService::new(providers, cfg.service_settings()).with_sink(sink);

    let passes = run_until(&service, &cfg.poll_settings(), shutdown_signal()).await;

    let report = service.get_performance_report();
    info!(
        passes,
        providers = report.summary.total_providers,
        healthy = report.summary.healthy_providers,
        avg_reliability = report.summary.avg_reliability,
        "OddsBot stopped"
    );
    Ok(())
}

/// Print broadcast notifications as JSON lines on stdout
async fn forward_events(mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{event}"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification consumer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
