// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Plant disease detection endpoint handler

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::request::DetectRequest;
use crate::api::errors::ApiError;
use crate::api::http_server::{AppState, ServerSettings};
use crate::solutions::SolutionCatalog;
use crate::vision::annotate::{Annotation, Annotator};
use crate::vision::detector::Detector;
use crate::vision::image_utils::{decode_image_bytes, encode_jpeg};

/// Result of running the detection pipeline on one upload
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Annotated image encoded as JPEG
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub detections: usize,
}

/// POST / - Detect plant diseases in an uploaded photo
///
/// # Request
/// Multipart form with:
/// - `plant_type`: one of the configured plant types (required)
/// - `image`: the photo to analyse (required)
///
/// # Response
/// The input photo as `image/jpeg`, with a green box and a
/// `"<disease label> <confidence>"` caption for every detection.
///
/// # Errors
/// - 400 Bad Request: missing field, unsupported plant type, model load
///   failure, undecodable image
/// - 500 Internal Server Error: inference failure or unmapped detection class
pub async fn detect_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let started = Instant::now();

    // 1. Parse and validate the form
    let multipart = multipart.map_err(|e| {
        warn!("Rejected detection request: {}", e);
        ApiError::InvalidRequest(e.body_text())
    })?;
    let request = DetectRequest::from_multipart(multipart).await?;
    if let Err(e) = request.validate() {
        warn!("Detection validation failed: {}", e);
        return Err(e);
    }

    debug!(
        "Detection request: plant_type={}, file={:?}, {} bytes",
        request.plant_type,
        request.file_name,
        request.image.len()
    );

    // 2. Validate plant type before touching the registry's loaders
    if let Some(message) = state.registry.validate(&request.plant_type) {
        warn!("{}", message);
        return Err(ApiError::InvalidPlantType(message));
    }

    // 3. Get (or load) the detector
    let detector = state.registry.load(&request.plant_type).await.map_err(|e| {
        warn!("{}", e);
        ApiError::from(e)
    })?;

    // 4. Decode, infer, annotate and encode off the async runtime
    let plant_type = request.plant_type.clone();
    let solutions = state.solutions.clone();
    let annotator = state.annotator.clone();
    let settings = state.settings;
    let image = request.image;

    let processed = tokio::task::spawn_blocking(move || {
        process_image(
            detector.as_ref(),
            &solutions,
            &annotator,
            &plant_type,
            &image,
            &settings,
        )
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("detection task failed: {}", e)))??;

    info!(
        "Detection complete: plant_type={}, {}x{}, {} detections, {}ms",
        request.plant_type,
        processed.width,
        processed.height,
        processed.detections,
        started.elapsed().as_millis()
    );

    // 5. Respond with the annotated JPEG
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], Bytes::from(processed.jpeg)).into_response())
}

/// Run decode, inference, annotation and encoding for one upload (blocking)
pub fn process_image(
    detector: &dyn Detector,
    solutions: &SolutionCatalog,
    annotator: &Annotator,
    plant_type: &str,
    image_bytes: &[u8],
    settings: &ServerSettings,
) -> Result<ProcessedImage, ApiError> {
    let (image, info) = decode_image_bytes(image_bytes, settings.max_upload_bytes).map_err(|e| {
        warn!("Failed to decode uploaded image: {}", e);
        ApiError::from(e)
    })?;
    debug!(
        "Decoded {:?} image {}x{} ({} bytes)",
        info.format, info.width, info.height, info.size_bytes
    );

    let detections = detector
        .predict(&image)
        .map_err(|e| ApiError::InferenceFailure(format!("{:#}", e)))?;

    let annotations = detections
        .iter()
        .map(|detection| -> Result<Annotation, ApiError> {
            let data = solutions.get_solution_data(plant_type, &detection.class_name)?;
            Ok(Annotation::new(detection.bbox, &data.disease_label, detection.confidence))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let annotated = annotator.annotate(&image, &annotations);
    let jpeg = encode_jpeg(&annotated, settings.jpeg_quality)?;

    Ok(ProcessedImage {
        jpeg,
        width: info.width,
        height: info.height,
        detections: annotations.len(),
    })
}
