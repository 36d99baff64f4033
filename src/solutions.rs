// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Solution data lookup
//!
//! Maps a (plant type, detected class) pair to the human-readable disease
//! metadata drawn next to each detection. The catalog is built once at startup
//! and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

use crate::config::PlantCatalogConfig;

/// Reference metadata for one detected class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionData {
    /// Label drawn on the annotated image
    pub disease_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment: Option<String>,
}

impl SolutionData {
    pub fn new(disease_label: impl Into<String>) -> Self {
        Self {
            disease_label: disease_label.into(),
            description: None,
            treatment: None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SolutionError {
    #[error("No solution data for plant type '{0}'")]
    UnknownPlantType(String),

    #[error("No solution data for class '{class_name}' of plant type '{plant_type}'")]
    UnmappedClass {
        plant_type: String,
        class_name: String,
    },

    #[error("Plant type '{plant_type}' has classes without solution data: {missing:?}")]
    IncompleteCoverage {
        plant_type: String,
        missing: Vec<String>,
    },
}

/// Read-only (plant type, class) -> solution data store
#[derive(Debug, Clone, Default)]
pub struct SolutionCatalog {
    entries: HashMap<String, HashMap<String, SolutionData>>,
}

impl SolutionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from the plant catalog config
    ///
    /// Fails when any configured class has no solution record, so a detector
    /// can never emit a class the catalog cannot label.
    pub fn from_config(config: &PlantCatalogConfig) -> Result<Self, SolutionError> {
        let mut catalog = Self::new();
        for plant in &config.plant_types {
            for (class_name, data) in &plant.solutions {
                catalog.insert(&plant.name, class_name, data.clone());
            }
            catalog.check_coverage(&plant.name, &plant.classes)?;
        }

        info!(
            "Solution catalog ready: {} records across {} plant types",
            catalog.len(),
            catalog.entries.len()
        );
        Ok(catalog)
    }

    pub fn insert(
        &mut self,
        plant_type: impl Into<String>,
        class_name: impl Into<String>,
        data: SolutionData,
    ) {
        self.entries
            .entry(plant_type.into())
            .or_default()
            .insert(class_name.into(), data);
    }

    /// Builder-style variant of `insert`
    pub fn with_solution(
        mut self,
        plant_type: impl Into<String>,
        class_name: impl Into<String>,
        data: SolutionData,
    ) -> Self {
        self.insert(plant_type, class_name, data);
        self
    }

    /// Look up the solution data for a detected class
    pub fn get_solution_data(
        &self,
        plant_type: &str,
        class_name: &str,
    ) -> Result<&SolutionData, SolutionError> {
        let classes = self
            .entries
            .get(plant_type)
            .ok_or_else(|| SolutionError::UnknownPlantType(plant_type.to_string()))?;

        classes
            .get(class_name)
            .ok_or_else(|| SolutionError::UnmappedClass {
                plant_type: plant_type.to_string(),
                class_name: class_name.to_string(),
            })
    }

    /// Check that every class in `classes` has a solution record
    pub fn check_coverage(&self, plant_type: &str, classes: &[String]) -> Result<(), SolutionError> {
        let known = self.entries.get(plant_type);
        let missing: Vec<String> = classes
            .iter()
            .filter(|class| !known.map(|k| k.contains_key(*class)).unwrap_or(false))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SolutionError::IncompleteCoverage {
                plant_type: plant_type.to_string(),
                missing,
            })
        }
    }

    /// Sorted class names with solution data for a plant type
    pub fn classes(&self, plant_type: &str) -> Vec<&str> {
        let mut classes: Vec<&str> = self
            .entries
            .get(plant_type)
            .map(|c| c.keys().map(String::as_str).collect())
            .unwrap_or_default();
        classes.sort_unstable();
        classes
    }

    /// Total number of solution records
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
