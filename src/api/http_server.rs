// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::detect::detect_handler;
use super::handlers::{health_handler, plant_types_handler};
use crate::solutions::SolutionCatalog;
use crate::vision::annotate::Annotator;
use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::model_registry::ModelRegistry;

/// Slack for multipart boundaries and the `plant_type` field
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Per-request limits and output settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerSettings {
    /// Largest accepted image payload in bytes
    pub max_upload_bytes: usize,
    /// JPEG quality of the annotated response (1-100)
    pub jpeg_quality: u8,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_IMAGE_SIZE,
            jpeg_quality: crate::config::args::DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub solutions: Arc<SolutionCatalog>,
    pub annotator: Arc<Annotator>,
    pub settings: ServerSettings,
}

impl AppState {
    pub fn new(registry: ModelRegistry, solutions: SolutionCatalog, annotator: Annotator) -> Self {
        Self {
            registry: Arc::new(registry),
            solutions: Arc::new(solutions),
            annotator: Arc::new(annotator),
            settings: ServerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Build the router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // Detection endpoint
        .route("/", post(detect_handler))
        // Health check
        .route("/health", get(health_handler))
        // Plant type listing
        .route("/v1/plant-types", get(plant_types_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn start_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}
