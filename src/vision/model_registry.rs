// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Model registry: plant type -> cached detector
//!
//! Every supported plant type is registered at startup with its loader and an
//! empty `OnceCell`. The set of plant types never changes afterwards, so the
//! only shared mutable state is the per-key cell, which is filled at most once
//! even when several requests race on first use.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::PlantCatalogConfig;
use crate::vision::detector::{Detector, DetectorLoader};
use crate::vision::yolo::OnnxDetectorLoader;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("{0}")]
    UnsupportedPlantType(String),

    #[error("Failed to load model for plant type '{plant_type}': {message}")]
    ModelLoad { plant_type: String, message: String },
}

struct RegistryEntry {
    loader: Arc<dyn DetectorLoader>,
    detector: OnceCell<Arc<dyn Detector>>,
}

/// Information about a registered plant type
#[derive(Debug, Clone)]
pub struct PlantTypeInfo {
    pub name: String,
    pub loaded: bool,
}

/// Registry of per-plant-type detectors with a load-once cache
#[derive(Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("plant_types", &self.plant_types())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry with one ONNX detector loader per catalog entry
    pub fn from_catalog(catalog: &PlantCatalogConfig) -> Self {
        let mut registry = Self::new();
        for plant in &catalog.plant_types {
            registry.register(&plant.name, Arc::new(OnnxDetectorLoader::new(plant.clone())));
        }
        info!(
            "Model registry initialized with {} plant types",
            registry.entries.len()
        );
        registry
    }

    /// Register the loader for a plant type, replacing any previous one
    pub fn register(&mut self, plant_type: impl Into<String>, loader: Arc<dyn DetectorLoader>) {
        let plant_type = plant_type.into();
        debug!("Registering detector loader for plant type '{}'", plant_type);
        self.entries.insert(
            plant_type,
            RegistryEntry {
                loader,
                detector: OnceCell::new(),
            },
        );
    }

    /// Builder-style variant of `register`
    pub fn with_loader(mut self, plant_type: impl Into<String>, loader: Arc<dyn DetectorLoader>) -> Self {
        self.register(plant_type, loader);
        self
    }

    /// Supported plant types in sorted order
    pub fn plant_types(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Registered plant types with their cache state
    pub fn list(&self) -> Vec<PlantTypeInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| PlantTypeInfo {
                name: name.clone(),
                loaded: entry.detector.initialized(),
            })
            .collect()
    }

    /// Check that a plant type is supported
    ///
    /// Returns `None` when it is, otherwise a message for the client.
    pub fn validate(&self, plant_type: &str) -> Option<String> {
        if self.entries.contains_key(plant_type) {
            None
        } else {
            Some(self.unsupported_message(plant_type))
        }
    }

    /// Get the detector for a plant type, loading it on first use
    ///
    /// Concurrent callers for the same plant type wait on the same load; a
    /// failed load leaves the cell empty so a later call retries.
    pub async fn load(&self, plant_type: &str) -> Result<Arc<dyn Detector>, RegistryError> {
        let entry = self
            .entries
            .get(plant_type)
            .ok_or_else(|| RegistryError::UnsupportedPlantType(self.unsupported_message(plant_type)))?;

        let detector = entry
            .detector
            .get_or_try_init(|| async {
                info!("Loading detector for plant type '{}'", plant_type);
                let started = Instant::now();
                let loader = entry.loader.clone();

                let result = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| anyhow::anyhow!("model loading task failed: {}", e))
                    .and_then(|loaded| loaded);

                match result {
                    Ok(detector) => {
                        info!(
                            "✅ Detector for plant type '{}' loaded in {:.2?}",
                            plant_type,
                            started.elapsed()
                        );
                        Ok(detector)
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ Failed to load detector for plant type '{}': {:#}",
                            plant_type, e
                        );
                        Err(RegistryError::ModelLoad {
                            plant_type: plant_type.to_string(),
                            message: format!("{:#}", e),
                        })
                    }
                }
            })
            .await?;

        Ok(detector.clone())
    }

    /// Load every registered plant type, stopping at the first failure
    pub async fn preload_all(&self) -> Result<(), RegistryError> {
        for plant_type in self.plant_types() {
            self.load(plant_type).await?;
        }
        Ok(())
    }

    pub fn is_loaded(&self, plant_type: &str) -> bool {
        self.entries
            .get(plant_type)
            .map(|entry| entry.detector.initialized())
            .unwrap_or(false)
    }

    pub fn loaded_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.detector.initialized())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn unsupported_message(&self, plant_type: &str) -> String {
        format!(
            "Unsupported plant type '{}'. Supported plant types: {}",
            plant_type,
            self.plant_types().join(", ")
        )
    }
}
