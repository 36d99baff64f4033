// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Detection endpoint tests for POST /
//!
//! These tests drive the full router with an in-memory detector and verify:
//! - Unsupported plant types are rejected before any model load
//! - Undecodable uploads get the fixed decode error message
//! - Successful requests return a JPEG of the input's dimensions with boxes
//! - Server-side faults are reported with the generic message
//! - Concurrent first requests share a single model load

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use plant_disease_node::{
    api::{
        create_app, AppState, ErrorResponse, ServerSettings, INTERNAL_ERROR_MESSAGE,
        INVALID_IMAGE_MESSAGE,
    },
    solutions::{SolutionCatalog, SolutionData},
    vision::{Annotator, BoundingBox, Detection, Detector, DetectorLoader, ModelRegistry, StaticDetector},
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "plant-disease-test-boundary";

/// Loader that counts how often it is asked to materialize a detector
struct CountingLoader {
    calls: Arc<AtomicUsize>,
    detections: Vec<Detection>,
    fail: bool,
}

impl DetectorLoader for CountingLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn Detector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Widen the first-use race window
        std::thread::sleep(std::time::Duration::from_millis(20));
        if self.fail {
            anyhow::bail!("weights file is missing");
        }
        Ok(Arc::new(StaticDetector::new(self.detections.clone())))
    }
}

struct FailingDetector;

impl Detector for FailingDetector {
    fn predict(&self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        anyhow::bail!("onnx session error")
    }
}

struct FailingDetectorLoader;

impl DetectorLoader for FailingDetectorLoader {
    fn load(&self) -> anyhow::Result<Arc<dyn Detector>> {
        Ok(Arc::new(FailingDetector))
    }
}

fn detection(x1: i32, y1: i32, x2: i32, y2: i32, class_name: &str, confidence: f32) -> Detection {
    Detection {
        bbox: BoundingBox::new(x1, y1, x2, y2).unwrap(),
        class_name: class_name.to_string(),
        confidence,
    }
}

fn solutions() -> SolutionCatalog {
    SolutionCatalog::new()
        .with_solution("tomato", "early_blight", SolutionData::new("Early Blight"))
        .with_solution("tomato", "healthy", SolutionData::new("Healthy"))
        .with_solution("corn", "rust", SolutionData::new("Common Rust"))
}

/// Helper: Build an app whose tomato loader returns `detections`
fn setup_app(detections: Vec<Detection>) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = ModelRegistry::new()
        .with_loader(
            "tomato",
            Arc::new(CountingLoader {
                calls: calls.clone(),
                detections,
                fail: false,
            }),
        )
        .with_loader(
            "corn",
            Arc::new(CountingLoader {
                calls: calls.clone(),
                detections: vec![],
                fail: true,
            }),
        );

    let state = AppState::new(registry, solutions(), Annotator::default());
    (create_app(state), calls)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([60, 60, 60]));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Helper: Encode a multipart form body
fn multipart_body(plant_type: Option<&str>, image: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(plant_type) = plant_type {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"plant_type\"\r\n\r\n{plant_type}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"leaf.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn detect_request(plant_type: Option<&str>, image: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(plant_type, image)))
        .unwrap()
}

async fn error_body(response: axum::response::Response) -> ErrorResponse {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unsupported_plant_type_is_rejected_without_loading() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("banana"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body.status, "error");
    assert!(body.message.contains("banana"));
    assert!(body.message.contains("tomato"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plant_type_whitespace_is_trimmed() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("  tomato \t"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_plant_type_match_is_case_sensitive() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("Tomato"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_undecodable_image_returns_fixed_message() {
    let (app, _calls) = setup_app(vec![]);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(b"this is not an image at all".as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert_eq!(body.message, INVALID_IMAGE_MESSAGE);
}

#[tokio::test]
async fn test_no_detections_returns_same_size_jpeg() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(80, 60);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (80, 60));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_detections_are_drawn_at_their_boxes() {
    let (app, _calls) = setup_app(vec![
        detection(10, 10, 40, 40, "early_blight", 0.87),
        detection(50, 20, 90, 70, "healthy", 0.55),
    ]);
    let image = png_bytes(100, 80);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
    assert_eq!(decoded.dimensions(), (100, 80));

    let is_green = |x: u32, y: u32| {
        let p = decoded.get_pixel(x, y);
        p[1] > 150 && p[0] < 120 && p[2] < 120
    };
    // Left edges of both boxes
    assert!(is_green(10, 25));
    assert!(is_green(50, 45));
    // Box interiors and background stay grey
    assert!(!is_green(25, 25));
    assert!(!is_green(70, 45));
    assert!(!is_green(2, 78));
}

#[tokio::test]
async fn test_detection_caption_is_drawn_above_box() {
    let (app, _calls) = setup_app(vec![detection(10, 40, 70, 70, "early_blight", 0.87)]);
    let image = png_bytes(100, 100);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();

    let green_above_box = (0..38)
        .flat_map(|y| (0..100).map(move |x| (x, y)))
        .filter(|&(x, y)| {
            let p = decoded.get_pixel(x, y);
            p[1] > 150 && p[0] < 120 && p[2] < 120
        })
        .count();
    assert!(green_above_box > 10, "caption pixels: {}", green_above_box);
}

#[tokio::test]
async fn test_netpbm_upload_is_decoded() {
    let (app, _calls) = setup_app(vec![]);
    let mut ppm = b"P6\n2 2\n255\n".to_vec();
    ppm.extend_from_slice(&[200, 10, 10, 10, 200, 10, 10, 10, 200, 90, 90, 90]);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(ppm.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (2, 2));
}

#[tokio::test]
async fn test_unmapped_class_is_internal_error() {
    let (app, _calls) = setup_app(vec![detection(5, 5, 20, 20, "late_blight", 0.9)]);
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body.message, INTERNAL_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_inference_failure_is_internal_error() {
    let registry = ModelRegistry::new().with_loader("tomato", Arc::new(FailingDetectorLoader));
    let app = create_app(AppState::new(registry, solutions(), Annotator::default()));
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = error_body(response).await;
    assert_eq!(body.status, "error");
    assert_eq!(body.message, INTERNAL_ERROR_MESSAGE);
    assert!(!body.message.contains("onnx"));
}

#[tokio::test]
async fn test_model_load_failure_is_client_error() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(32, 32);

    let response = app
        .oneshot(detect_request(Some("corn"), Some(image.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = error_body(response).await;
    assert!(body.message.contains("weights file is missing"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_fields_are_rejected() {
    let (app, calls) = setup_app(vec![]);
    let image = png_bytes(16, 16);

    let response = app
        .clone()
        .oneshot(detect_request(None, Some(image.as_slice())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_body(response).await.message.contains("plant_type"));

    let response = app
        .oneshot(detect_request(Some("tomato"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(error_body(response).await.message.contains("image"));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_multipart_body_is_rejected_as_json() {
    let (app, _calls) = setup_app(vec![]);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"plant_type":"tomato"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await.status, "error");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let registry = ModelRegistry::new().with_loader(
        "tomato",
        Arc::new(CountingLoader {
            calls: Arc::new(AtomicUsize::new(0)),
            detections: vec![],
            fail: false,
        }),
    );
    let state = AppState::new(registry, solutions(), Annotator::default()).with_settings(
        ServerSettings {
            max_upload_bytes: 1024,
            jpeg_quality: 90,
        },
    );
    let app = create_app(state);

    // Larger than the decoder limit but inside the body limit slack
    let payload = vec![0u8; 4096];
    let response = app
        .oneshot(detect_request(Some("tomato"), Some(payload.as_slice())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_load_model_once() {
    let (app, calls) = setup_app(vec![detection(2, 2, 12, 12, "healthy", 0.7)]);
    let image = Arc::new(png_bytes(24, 24));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let app = app.clone();
        let image = image.clone();
        tasks.push(tokio::spawn(async move {
            app.oneshot(detect_request(Some("tomato"), Some(image.as_slice())))
                .await
                .unwrap()
                .status()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
