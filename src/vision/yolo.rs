// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! YOLO-style ONNX detector
//!
//! Runs an exported YOLOv8 detection model with ONNX Runtime on the CPU.
//! The model takes a `[1, 3, S, S]` RGB tensor scaled to `[0, 1]` and emits
//! `[1, 4 + num_classes, N]` candidates (`cx, cy, w, h` then one score per
//! class). The transposed `[1, N, 4 + num_classes]` layout is accepted too.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{Array4, ArrayViewD, Ix3};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::PlantTypeConfig;
use crate::vision::detector::{BoundingBox, Detection, Detector, DetectorLoader};

/// Post-processing parameters for one plant type's model
#[derive(Debug, Clone, PartialEq)]
pub struct YoloParams {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

impl From<&PlantTypeConfig> for YoloParams {
    fn from(config: &PlantTypeConfig) -> Self {
        Self {
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// ONNX Runtime backed detector for a single plant type
pub struct OnnxYoloDetector {
    /// ONNX Runtime session; `run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    classes: Vec<String>,
    params: YoloParams,
}

impl std::fmt::Debug for OnnxYoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxYoloDetector")
            .field("input_name", &self.input_name)
            .field("classes", &self.classes)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl OnnxYoloDetector {
    /// Load a detection model from disk (blocking)
    pub fn load<P: AsRef<Path>>(model_path: P, classes: Vec<String>, params: YoloParams) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Detection model not found: {}", model_path.display());
        }

        info!("Loading detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        if let Some(input) = session.inputs.first() {
            debug!("Detection model input {}: {:?}", input_name, input.input_type);
        }

        info!(
            "✅ Detection model loaded ({} classes, input {}x{})",
            classes.len(),
            params.input_size,
            params.input_size
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            classes,
            params,
        })
    }
}

impl Detector for OnnxYoloDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = image.dimensions();
        let input = preprocess(image, self.params.input_size);

        let input_value = Value::from_array(input).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("Detection session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input_value])
            .context("Detection inference failed")?;

        let first = first_output(outputs.values())?;
        let output = first
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;

        debug!("Detection output shape: {:?}", output.shape());

        let candidates = decode_output(output.view(), &self.classes, &self.params, width, height)?;
        let detections = non_max_suppression(candidates, self.params.iou_threshold, self.params.max_detections);

        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

/// The detection head is the model's first output
fn first_output<T>(outputs: impl IntoIterator<Item = T>) -> Result<T> {
    outputs
        .into_iter()
        .next()
        .context("Detection model produced no outputs")
}

/// Resize to the model's square input and convert to a normalized NCHW tensor
pub fn preprocess(image: &RgbImage, input_size: u32) -> Array4<f32> {
    let resized = image::imageops::resize(image, input_size, input_size, FilterType::Triangle);
    let size = input_size as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    tensor
}

/// Turn raw model output into scored candidates in original image coordinates
///
/// Candidates below the confidence threshold or whose box collapses after
/// clamping to the image are dropped. Class indices beyond the configured
/// list are named `class_<index>`.
pub fn decode_output(
    output: ArrayViewD<'_, f32>,
    classes: &[String],
    params: &YoloParams,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<Detection>> {
    if output.ndim() != 3 || output.shape()[0] != 1 {
        anyhow::bail!(
            "Unexpected detection output shape {:?}, expected [1, C, N]",
            output.shape()
        );
    }
    let output = output
        .into_dimensionality::<Ix3>()
        .context("Failed to view detection output as 3-D")?;
    let shape = output.shape();

    let attrs = 4 + classes.len();
    // Channels-first is the native YOLOv8 export; fall back to [1, N, C]
    let channels_first = if shape[1] == attrs {
        true
    } else if shape[2] == attrs {
        false
    } else if shape[1] > 4 && (shape[1] <= shape[2] || shape[2] <= 4) {
        true
    } else if shape[2] > 4 {
        false
    } else {
        anyhow::bail!(
            "Detection output shape {:?} does not match {} classes",
            shape,
            classes.len()
        );
    };

    let (num_attrs, num_candidates) = if channels_first {
        (shape[1], shape[2])
    } else {
        (shape[2], shape[1])
    };
    let value = |attr: usize, candidate: usize| -> f32 {
        if channels_first {
            output[[0, attr, candidate]]
        } else {
            output[[0, candidate, attr]]
        }
    };

    let scale_x = image_width as f32 / params.input_size as f32;
    let scale_y = image_height as f32 / params.input_size as f32;

    let mut detections = Vec::new();
    for candidate in 0..num_candidates {
        let (class_id, confidence) = (4..num_attrs)
            .map(|attr| (attr - 4, value(attr, candidate)))
            .fold((0usize, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        if !(confidence >= params.confidence_threshold) {
            continue;
        }

        let cx = value(0, candidate);
        let cy = value(1, candidate);
        let w = value(2, candidate);
        let h = value(3, candidate);

        let Some(bbox) = BoundingBox::from_corners_clamped(
            (cx - w / 2.0) * scale_x,
            (cy - h / 2.0) * scale_y,
            (cx + w / 2.0) * scale_x,
            (cy + h / 2.0) * scale_y,
            image_width,
            image_height,
        ) else {
            continue;
        };

        let class_name = classes
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id));

        detections.push(Detection {
            bbox,
            class_name,
            confidence,
        });
    }

    Ok(detections)
}

/// Class-wise non-maximum suppression, highest confidence first
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_name == candidate.class_name && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Loads the ONNX detector described by a plant type's catalog entry
#[derive(Debug, Clone)]
pub struct OnnxDetectorLoader {
    config: PlantTypeConfig,
}

impl OnnxDetectorLoader {
    pub fn new(config: PlantTypeConfig) -> Self {
        Self { config }
    }
}

impl DetectorLoader for OnnxDetectorLoader {
    fn load(&self) -> Result<Arc<dyn Detector>> {
        let detector = OnnxYoloDetector::load(
            &self.config.model_path,
            self.config.classes.clone(),
            YoloParams::from(&self.config),
        )
        .with_context(|| format!("plant type '{}'", self.config.name))?;
        Ok(Arc::new(detector))
    }
}
