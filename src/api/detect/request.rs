// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection request parsing and validation

use axum::body::Bytes;
use axum_extra::extract::multipart::{Multipart, MultipartError};
use tracing::debug;

use crate::api::errors::ApiError;

/// Multipart field carrying the plant type name
pub const PLANT_TYPE_FIELD: &str = "plant_type";
/// Multipart field carrying the image file
pub const IMAGE_FIELD: &str = "image";

/// Form submitted to `POST /`
#[derive(Debug, Clone, Default)]
pub struct DetectRequest {
    /// Plant type identifier, empty when the field was not sent
    pub plant_type: String,
    /// Raw uploaded file bytes, empty when the field was not sent
    pub image: Bytes,
    /// Client-side file name, logged only
    pub file_name: Option<String>,
}

impl DetectRequest {
    /// Read the `plant_type` and `image` fields from a multipart body
    ///
    /// Unknown fields are skipped. A repeated field keeps its last value.
    /// Surrounding whitespace is stripped from `plant_type`.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut request = DetectRequest::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            match field.name() {
                Some(PLANT_TYPE_FIELD) => {
                    let text = field.text().await.map_err(multipart_error)?;
                    request.plant_type = text.trim().to_string();
                }
                Some(IMAGE_FIELD) => {
                    request.file_name = field.file_name().map(str::to_string);
                    request.image = field.bytes().await.map_err(multipart_error)?;
                }
                other => {
                    debug!("Ignoring unexpected multipart field {:?}", other);
                }
            }
        }

        Ok(request)
    }

    /// Validate that both form fields were provided
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.plant_type.is_empty() {
            return Err(ApiError::ValidationError {
                field: PLANT_TYPE_FIELD.to_string(),
                message: "plant_type is required".to_string(),
            });
        }

        if self.image.is_empty() {
            return Err(ApiError::ValidationError {
                field: IMAGE_FIELD.to_string(),
                message: "image is required".to_string(),
            });
        }

        Ok(())
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    ApiError::InvalidRequest(format!("Malformed multipart body: {}", err.body_text()))
}
