// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for plant disease detection
//!
//! This module provides:
//! - Image decoding and JPEG encoding
//! - Per-plant-type YOLO detectors on ONNX Runtime (CPU only)
//! - A load-once model registry
//! - Detection overlay rendering

pub mod annotate;
pub mod detector;
pub mod image_utils;
pub mod model_registry;
pub mod yolo;

pub use annotate::{format_label, Annotation, Annotator, FontError, LabelFont};
pub use detector::{BoundingBox, Detection, Detector, DetectorLoader, StaticDetector};
pub use image_utils::{decode_image_bytes, detect_format, encode_jpeg, ImageError, ImageInfo};
pub use model_registry::{ModelRegistry, PlantTypeInfo, RegistryError};
pub use yolo::{OnnxDetectorLoader, OnnxYoloDetector, YoloParams};
