//! replay-vc - Voice conversion job server
//!
//! Accepts conversion jobs over HTTP, runs them one at a time in
//! submission order and reports progress via polling and SSE.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use replay_common::config::{resolve_root_folder, RootFolder, ROOT_ENV_VAR};
use replay_common::events::EventBus;
use replay_vc::capabilities::{DirectoryModelLoader, HttpFetcher, UnavailableSeparator};
use replay_vc::config::ServiceConfig;
use replay_vc::services::{ConversionJobRunner, JobLifecycleManager};
use replay_vc::AppState;

/// Command-line arguments for replay-vc
#[derive(Parser, Debug)]
#[command(name = "replay-vc")]
#[command(about = "Voice conversion job server")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "REPLAY_VC_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(long, env = "REPLAY_VC_HOST")]
    host: Option<String>,

    /// Root folder holding models and default outputs
    #[arg(short, long)]
    root_folder: Option<String>,

    /// Service config file (TOML)
    #[arg(short, long, env = "REPLAY_VC_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replay_vc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        build_timestamp = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting replay-vc"
    );

    let config = ServiceConfig::load(args.config.as_deref()).context("Failed to load config")?;
    let root = RootFolder::new(resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_ENV_VAR,
    ));
    root.ensure_directories()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root.path().display());

    let output_dir = config.output_dir(&root);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    info!("Default output directory: {}", output_dir.display());
    info!("Models directory: {}", config.models_dir(&root).display());

    let runner = ConversionJobRunner::new(
        Arc::new(UnavailableSeparator),
        Arc::new(DirectoryModelLoader),
        Arc::new(HttpFetcher::new(tokio::runtime::Handle::current())),
    )
    .with_lock_capacity(config.separation_lock_capacity);

    let event_bus = EventBus::new(config.event_capacity);
    let jobs = JobLifecycleManager::start(Arc::new(runner), event_bus, output_dir);
    let state = AppState::new(jobs.clone(), config.stale_after());

    let app = replay_vc::build_router(state);

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    jobs.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
