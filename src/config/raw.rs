// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types. Kept apart from the public config so
// interpolation, defaults and validation happen in one place (the loader).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub turnstream: String,
    pub environment: Option<String>,
    pub upstream: RawUpstreamConfig,
    pub stream: Option<RawStreamConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawUpstreamConfig {
    pub base_url: String,
    pub path: Option<String>,
    pub format: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStreamConfig {
    pub default_author: Option<String>,
    pub parts_field: Option<String>,
    pub author_field: Option<String>,
    pub frame_marker: Option<String>,
    pub fingerprint_prefix_chars: Option<usize>,
    pub compact_threshold_bytes: Option<usize>,
    pub channel_capacity: Option<usize>,
}
