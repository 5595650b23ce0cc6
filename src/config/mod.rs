// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads turnstream.yaml, resolves variable interpolation, fills defaults,
// validates values, and computes a deterministic contract hash.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::*;
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, FormatSetting, StreamSettings, UpstreamConfig};
