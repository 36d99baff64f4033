// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod solutions;
pub mod version;
pub mod vision;

// Re-export main types
pub use api::{create_app, AppState, ServerSettings};
pub use config::{Args, PlantCatalogConfig, PlantTypeConfig};
pub use solutions::{SolutionCatalog, SolutionData, SolutionError};
pub use vision::{Detection, Detector, DetectorLoader, ModelRegistry};
