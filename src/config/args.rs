// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use clap::Parser;
use std::path::PathBuf;

use crate::vision::image_utils::MAX_IMAGE_SIZE;

/// Default JPEG quality for annotated responses
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Plant Disease Node
#[derive(Parser, Debug, Clone)]
#[command(name = "plant-disease-node")]
#[command(version)]
#[command(about = "Detects plant diseases in uploaded images and returns them annotated", long_about = None)]
pub struct Args {
    /// Address the HTTP server binds to
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Plant catalog (TOML) describing detectors and solution data
    #[arg(long, env = "PLANT_CATALOG", default_value = "./config/plants.toml")]
    pub catalog: PathBuf,

    /// TTF/OTF font for label text, overriding the embedded DejaVu Sans
    #[arg(long, env = "LABEL_FONT_PATH")]
    pub label_font: Option<PathBuf>,

    /// Maximum accepted upload size in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = MAX_IMAGE_SIZE)]
    pub max_upload_bytes: usize,

    /// JPEG quality of the annotated image (1-100)
    #[arg(long, env = "JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,

    /// Load every plant type's model at startup instead of on first use
    #[arg(long, env = "PRELOAD_MODELS", default_value_t = false)]
    pub preload: bool,
}

impl Args {
    /// JPEG quality clamped to the range the encoder accepts
    pub fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}
