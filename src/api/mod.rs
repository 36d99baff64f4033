// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod detect;
pub mod errors;
pub mod handlers;
pub mod http_server;

pub use detect::{detect_handler, DetectRequest};
pub use errors::{ApiError, ErrorResponse, INTERNAL_ERROR_MESSAGE, INVALID_IMAGE_MESSAGE};
pub use handlers::{HealthResponse, PlantTypeEntry, PlantTypesResponse};
pub use http_server::{create_app, start_server, AppState, ServerSettings};
