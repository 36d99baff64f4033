// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection overlay rendering
//!
//! Draws a green box per detection and the `"<disease label> <confidence>"`
//! caption just above the box's top-left corner. Captions use the embedded
//! DejaVu Sans font unless another font is supplied. The input image is never
//! modified; a copy is returned.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;
use std::sync::Arc;
use tracing::{info, warn};

use crate::vision::detector::BoundingBox;

/// Box and label color
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Box outline thickness in pixels
pub const BOX_THICKNESS: i32 = 2;
/// Vertical gap between the label baseline and the box top
pub const LABEL_OFFSET: i32 = 10;
/// Label glyph height in pixels
pub const LABEL_SCALE: f32 = 16.0;

/// Font shipped with the binary for captions
static EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Debug, Error)]
pub enum FontError {
    #[error("Failed to read label font {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid label font data")]
    InvalidFont,
}

/// TrueType/OpenType font used for detection labels
pub struct LabelFont {
    font: FontArc,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelFont").finish_non_exhaustive()
    }
}

impl LabelFont {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = Self::from_bytes(bytes)?;
        info!("Label font loaded from {}", path.display());
        Ok(font)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, FontError> {
        let font = FontArc::try_from_vec(bytes).map_err(|_| FontError::InvalidFont)?;
        Ok(Self { font })
    }

    /// The DejaVu Sans font compiled into the binary
    pub fn embedded() -> Result<Self, FontError> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT).map_err(|_| FontError::InvalidFont)?;
        Ok(Self { font })
    }
}

/// One box to draw with its caption
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub label: String,
}

impl Annotation {
    pub fn new(bbox: BoundingBox, disease_label: &str, confidence: f32) -> Self {
        Self {
            bbox,
            label: format_label(disease_label, confidence),
        }
    }
}

/// Caption text: the disease label followed by the confidence to two decimals
pub fn format_label(disease_label: &str, confidence: f32) -> String {
    format!("{} {:.2}", disease_label, confidence)
}

/// Renders annotations onto copies of images
///
/// Without a font only the boxes are drawn.
#[derive(Debug, Clone)]
pub struct Annotator {
    font: Option<Arc<LabelFont>>,
}

impl Default for Annotator {
    /// Annotator captioning with the embedded font
    fn default() -> Self {
        match LabelFont::embedded() {
            Ok(font) => Self::new(Some(Arc::new(font))),
            Err(e) => {
                warn!("Embedded label font unusable, captions disabled: {}", e);
                Self::new(None)
            }
        }
    }
}

impl Annotator {
    pub fn new(font: Option<Arc<LabelFont>>) -> Self {
        Self { font }
    }

    /// Boxes only, no captions
    pub fn boxes_only() -> Self {
        Self::new(None)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every annotation on a copy of `image`
    pub fn annotate(&self, image: &RgbImage, annotations: &[Annotation]) -> RgbImage {
        let mut canvas = image.clone();
        for annotation in annotations {
            draw_box(&mut canvas, &annotation.bbox);
            if let Some(font) = &self.font {
                draw_label(&mut canvas, &annotation.bbox, &annotation.label, font);
            }
        }
        canvas
    }
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox) {
    // Inset rectangles, one per pixel of thickness
    for inset in 0..BOX_THICKNESS {
        let width = bbox.width() + 1 - 2 * inset;
        let height = bbox.height() + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

fn draw_label(canvas: &mut RgbImage, bbox: &BoundingBox, label: &str, font: &LabelFont) {
    if label.is_empty() {
        return;
    }
    let scale = PxScale::from(LABEL_SCALE);
    let (_, text_height) = text_size(scale, &font.font, label);
    // draw_text_mut positions the top of the text; keep it on the canvas
    let top = (bbox.y1 - LABEL_OFFSET - text_height as i32).max(0);
    draw_text_mut(canvas, BOX_COLOR, bbox.x1, top, scale, &font.font, label);
}
