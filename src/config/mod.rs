// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node configuration
//!
//! - `args` - command line / environment settings for the HTTP node
//! - `catalog` - the plant catalog (detectors and solution data per plant type)

pub mod args;
pub mod catalog;

pub use args::Args;
pub use catalog::{ConfigError, PlantCatalogConfig, PlantTypeConfig};
