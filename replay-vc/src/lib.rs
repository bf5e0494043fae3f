//! replay-vc library interface
//!
//! Voice conversion job server: a FIFO job orchestrator around the
//! chunked conversion pipeline, with separation and pitch caches and a
//! thin HTTP layer.

pub mod api;
pub mod audio;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::JobLifecycleManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobLifecycleManager,
    /// Processing jobs silent for longer than this are reported stale
    pub stale_after: chrono::Duration,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(jobs: JobLifecycleManager, stale_after: chrono::Duration) -> Self {
        Self {
            jobs,
            stale_after,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::job_routes())
        .merge(api::stemming_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
