//! strata daemon.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use strata_core::config::AppConfig;
use strata_gc::GcScheduler;
use strata_server::{AppState, create_router};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// strata - a content-addressed binary store
#[derive(Parser, Debug)]
#[command(name = "stratad")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "STRATA_CONFIG",
        default_value = "config/strata.toml"
    )]
    config: String,
}

/// Load configuration: optional TOML file, then `STRATA_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("STRATA_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

/// Resolves on Ctrl-C or when `token` is cancelled.
async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        }
        _ = token.cancelled() => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("strata v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    strata_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let metadata = strata_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    metadata
        .migrate()
        .await
        .context("failed to migrate metadata store")?;
    tracing::info!("Metadata store initialized");

    let state = AppState::open(config.clone(), metadata)
        .await
        .context("failed to open binary store")?;
    tracing::info!(
        root = %state.store.chain().root().id(),
        providers = state.store.chain().nodes().len(),
        "Provider chain active"
    );

    let shutdown = CancellationToken::new();
    let scheduler = if config.gc.auto_schedule_enabled {
        Some(GcScheduler::spawn(
            state.gc.clone(),
            config.gc.auto_schedule_interval(),
            shutdown.clone(),
        ))
    } else {
        tracing::info!("Automatic GC scheduling disabled");
        None
    };

    let app = create_router(state.clone());
    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(scheduler) = scheduler
        && let Err(e) = scheduler.await
    {
        tracing::warn!(error = %e, "GC scheduler task failed");
    }
    state.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
