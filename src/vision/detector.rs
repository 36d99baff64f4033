// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detector capability shared by every plant type
//!
//! A `Detector` turns a decoded RGB image into detections. One
//! `DetectorLoader` is registered per plant type; the model registry calls it
//! at most once and shares the resulting detector across requests.

use anyhow::Result;
use image::RgbImage;
use serde::Serialize;
use std::sync::Arc;

/// Axis-aligned box in image pixel coordinates, `x1 < x2` and `y1 < y2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Create a box, returning `None` for degenerate coordinates
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Self> {
        if x1 < x2 && y1 < y2 {
            Some(Self { x1, y1, x2, y2 })
        } else {
            None
        }
    }

    /// Convert floating point corners to a box clamped inside a `width` x `height` image
    pub fn from_corners_clamped(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        if width == 0 || height == 0 || !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        Self::new(
            x1.clamp(0.0, max_x) as i32,
            y1.clamp(0.0, max_y) as i32,
            x2.clamp(0.0, max_x) as i32,
            y2.clamp(0.0, max_y) as i32,
        )
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        if ix1 >= ix2 || iy1 >= iy2 {
            return 0.0;
        }

        let intersection = (ix2 - ix1) as i64 * (iy2 - iy1) as i64;
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            0.0
        } else {
            intersection as f32 / union as f32
        }
    }
}

/// One model output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Class identifier as named by the plant type's class list
    pub class_name: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f32,
}

/// Detection capability for a single plant type
///
/// Implementations must be safe to call from several requests at once;
/// those backed by a non-reentrant runtime serialize access internally.
pub trait Detector: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// Materializes the detector for one plant type
#[cfg_attr(test, mockall::automock)]
pub trait DetectorLoader: Send + Sync {
    /// Load the detector (blocking: reads weights and builds the runtime session)
    fn load(&self) -> Result<Arc<dyn Detector>>;
}

/// Detector returning a fixed list of detections
///
/// Useful for wiring tests and dry runs of the HTTP surface without a model.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    detections: Vec<Detection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl Detector for StaticDetector {
    fn predict(&self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }
}
