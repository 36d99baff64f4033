// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use plant_disease_node::{
    api::{start_server, AppState, ServerSettings},
    config::{Args, PlantCatalogConfig},
    solutions::SolutionCatalog,
    version,
    vision::{Annotator, LabelFont, ModelRegistry},
};
use std::{env, net::SocketAddr, sync::Arc};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading RUST_LOG or any argument defaults
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("🚀 Starting {}", version::get_version_string());
    info!("📅 Build Date: {}", version::BUILD_DATE);
    debug!("Version info: {}", version::get_version_info());

    let addr: SocketAddr = args
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", args.listen_addr))?;

    // Plant catalog: detectors and solution data per plant type
    let catalog = PlantCatalogConfig::load(&args.catalog)?;
    let solutions = SolutionCatalog::from_config(&catalog)
        .context("Plant catalog is missing solution data")?;
    let registry = ModelRegistry::from_catalog(&catalog);

    if args.preload {
        info!("🧠 Preloading {} detection models...", registry.len());
        registry
            .preload_all()
            .await
            .context("Failed to preload detection models")?;
        info!("✅ All detection models loaded");
    } else {
        info!("Detection models will load on first use");
    }

    let label_font = match &args.label_font {
        Some(path) => LabelFont::from_file(path)?,
        None => {
            info!("🔤 Using embedded DejaVu Sans for detection labels");
            LabelFont::embedded()?
        }
    };
    let annotator = Annotator::new(Some(Arc::new(label_font)));

    let settings = ServerSettings {
        max_upload_bytes: args.max_upload_bytes,
        jpeg_quality: args.effective_jpeg_quality(),
    };

    let state = AppState::new(registry, solutions, annotator).with_settings(settings);
    start_server(state, addr).await
}
