// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plant catalog loading and validation
//!
//! The catalog is a TOML file with one `[[plant_types]]` entry per supported
//! plant type. Each entry names the ONNX detector, the class list the model
//! emits, optional detection thresholds and the solution data per class:
//!
//! ```toml
//! [[plant_types]]
//! name = "tomato"
//! model_path = "models/tomato.onnx"
//! classes = ["early_blight", "healthy"]
//!
//! [plant_types.solutions.early_blight]
//! disease_label = "Early Blight"
//!
//! [plant_types.solutions.healthy]
//! disease_label = "Healthy"
//! ```

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::solutions::SolutionData;

fn default_input_size() -> u32 {
    640
}

fn default_confidence_threshold() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    300
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read plant catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse plant catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid plant catalog: {0}")]
    Invalid(String),
}

/// Detector and solution settings for one plant type
#[derive(Debug, Clone, Deserialize)]
pub struct PlantTypeConfig {
    /// Plant type identifier clients send as `plant_type`
    pub name: String,
    /// Path to the ONNX detection model
    pub model_path: PathBuf,
    /// Class names in model output order
    pub classes: Vec<String>,
    /// Square model input size in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    /// Solution data keyed by class name
    #[serde(default)]
    pub solutions: HashMap<String, SolutionData>,
}

/// Parsed plant catalog
#[derive(Debug, Clone, Deserialize)]
pub struct PlantCatalogConfig {
    pub plant_types: Vec<PlantTypeConfig>,
}

impl PlantCatalogConfig {
    /// Load and validate a catalog file
    ///
    /// Relative `model_path` values are resolved against the catalog's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading plant catalog from {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let catalog = Self::from_toml_str(&contents, path.parent())?;
        info!(
            "Plant catalog loaded: {} plant types ({})",
            catalog.plant_types.len(),
            catalog.names().join(", ")
        );
        Ok(catalog)
    }

    /// Parse and validate a catalog from a TOML string
    pub fn from_toml_str(contents: &str, base_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut catalog: PlantCatalogConfig = toml::from_str(contents)?;

        if let Some(base_dir) = base_dir {
            for plant in &mut catalog.plant_types {
                if plant.model_path.is_relative() {
                    plant.model_path = base_dir.join(&plant.model_path);
                }
                debug!(
                    "Plant type '{}' uses model {}",
                    plant.name,
                    plant.model_path.display()
                );
            }
        }

        catalog.validate()?;
        Ok(catalog)
    }

    /// Plant type names in catalog order
    pub fn names(&self) -> Vec<&str> {
        self.plant_types.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PlantTypeConfig> {
        self.plant_types.iter().find(|p| p.name == name)
    }

    /// Validate the catalog structure
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plant_types.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one plant type must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for plant in &self.plant_types {
            plant.validate()?;
            if !seen.insert(plant.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate plant type '{}'",
                    plant.name
                )));
            }
        }

        Ok(())
    }
}

impl PlantTypeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("plant type name must not be empty".to_string()));
        }
        if self.name.trim() != self.name {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}' has surrounding whitespace",
                self.name
            )));
        }
        if self.classes.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}' must list at least one class",
                self.name
            )));
        }
        if self.input_size == 0 {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}': input_size must be positive",
                self.name
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}': confidence_threshold must be within [0, 1], got {}",
                self.name, self.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}': iou_threshold must be within [0, 1], got {}",
                self.name, self.iou_threshold
            )));
        }
        if self.max_detections == 0 {
            return Err(ConfigError::Invalid(format!(
                "plant type '{}': max_detections must be positive",
                self.name
            )));
        }
        Ok(())
    }
}
