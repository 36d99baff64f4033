// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection API endpoint module
//!
//! Provides POST / for annotating plant photos with disease detections.

pub mod handler;
pub mod request;

pub use handler::{detect_handler, process_image, ProcessedImage};
pub use request::DetectRequest;
