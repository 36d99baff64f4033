// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

use crate::solutions::SolutionError;
use crate::vision::image_utils::ImageError;
use crate::vision::model_registry::RegistryError;

/// Message returned for every payload that does not decode as an image
pub const INVALID_IMAGE_MESSAGE: &str =
    "Failed to decode image. The image may be corrupted or invalid.";

/// Message returned for every server-side failure
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ApiError {
    InvalidRequest(String),
    ValidationError {
        field: String,
        message: String,
    },
    InvalidPlantType(String),
    ModelLoadError(String),
    InvalidImage(String),
    InferenceFailure(String),
    UnmappedClass {
        plant_type: String,
        class_name: String,
    },
    InternalError(String),
}

impl ApiError {
    /// Client-facing body; server-side causes are replaced by a generic message
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::ValidationError { message, .. } => message.clone(),
            ApiError::InvalidPlantType(msg) => msg.clone(),
            ApiError::ModelLoadError(msg) => msg.clone(),
            ApiError::InvalidImage(_) => INVALID_IMAGE_MESSAGE.to_string(),
            ApiError::InferenceFailure(_)
            | ApiError::UnmappedClass { .. }
            | ApiError::InternalError(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        };

        ErrorResponse::new(message)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::InvalidPlantType(_)
            | ApiError::ModelLoadError(_)
            | ApiError::InvalidImage(_) => 400,
            ApiError::InferenceFailure(_)
            | ApiError::UnmappedClass { .. }
            | ApiError::InternalError(_) => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::InvalidPlantType(msg) => write!(f, "Invalid plant type: {}", msg),
            ApiError::ModelLoadError(msg) => write!(f, "Model load error: {}", msg),
            ApiError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            ApiError::InferenceFailure(msg) => write!(f, "Inference failed: {}", msg),
            ApiError::UnmappedClass {
                plant_type,
                class_name,
            } => write!(
                f,
                "Detected class '{}' has no solution data for plant type '{}'",
                class_name, plant_type
            ),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.is_server_error() {
            error!("Request failed: {}", self);
        }
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnsupportedPlantType(msg) => ApiError::InvalidPlantType(msg),
            RegistryError::ModelLoad { .. } => ApiError::ModelLoadError(err.to_string()),
        }
    }
}

impl From<SolutionError> for ApiError {
    fn from(err: SolutionError) -> Self {
        match err {
            SolutionError::UnmappedClass {
                plant_type,
                class_name,
            } => ApiError::UnmappedClass {
                plant_type,
                class_name,
            },
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<ImageError> for ApiError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::TooLarge(..) => ApiError::InvalidRequest(err.to_string()),
            ImageError::EncodeFailed(_) => ApiError::InternalError(err.to_string()),
            ImageError::UnsupportedFormat | ImageError::DecodeFailed(_) | ImageError::EmptyData => {
                ApiError::InvalidImage(err.to_string())
            }
        }
    }
}
