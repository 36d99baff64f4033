// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::http_server::AppState;
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub plant_types: usize,
    pub loaded_models: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantTypeEntry {
    pub name: String,
    pub classes: Vec<String>,
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantTypesResponse {
    pub plant_types: Vec<PlantTypeEntry>,
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: version::VERSION.to_string(),
        plant_types: state.registry.len(),
        loaded_models: state.registry.loaded_count(),
    })
}

/// GET /v1/plant-types - Supported plant types with their classes and cache state
pub async fn plant_types_handler(State(state): State<AppState>) -> Json<PlantTypesResponse> {
    let plant_types = state
        .registry
        .list()
        .into_iter()
        .map(|info| PlantTypeEntry {
            classes: state
                .solutions
                .classes(&info.name)
                .into_iter()
                .map(str::to_string)
                .collect(),
            name: info.name,
            loaded: info.loaded,
        })
        .collect();

    Json(PlantTypesResponse { plant_types })
}
