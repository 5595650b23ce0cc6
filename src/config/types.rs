// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use crate::stream::UpstreamFormat;

use super::defaults::*;

/// Validated configuration. Built only by `load_config`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Contract version, currently always "v1".
    pub version: String,
    /// Free-form deployment label, logged at startup.
    pub environment: String,
    pub upstream: UpstreamConfig,
    pub stream: StreamSettings,
    /// `sha256:<hex>` of the raw YAML.
    pub contract_hash: String,
}

/// Where agent runs are forwarded and how their bodies are framed.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Interpolated base URL without a trailing slash.
    pub base_url: String,
    /// Path appended to `base_url`, always starting with `/`.
    pub path: String,
    pub format: FormatSetting,
    pub timeout_ms: Option<u64>,
}

impl UpstreamConfig {
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Configured upstream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSetting {
    /// Decide per response from its content type.
    Auto,
    Fixed(UpstreamFormat),
}

impl FormatSetting {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(FormatSetting::Auto),
            "growing_document" => Some(FormatSetting::Fixed(UpstreamFormat::GrowingDocument)),
            "line_delimited" => Some(FormatSetting::Fixed(UpstreamFormat::LineDelimited)),
            _ => None,
        }
    }

    pub fn resolve(&self, content_type: Option<&str>) -> UpstreamFormat {
        match self {
            FormatSetting::Auto => UpstreamFormat::from_content_type(content_type),
            FormatSetting::Fixed(format) => *format,
        }
    }
}

/// Knobs shared by both producers and the client side decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub default_author: String,
    pub parts_field: String,
    pub author_field: String,
    pub frame_marker: String,
    pub fingerprint_prefix_chars: usize,
    pub compact_threshold_bytes: usize,
    pub channel_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            default_author: DEFAULT_AUTHOR.to_owned(),
            parts_field: DEFAULT_PARTS_FIELD.to_owned(),
            author_field: DEFAULT_AUTHOR_FIELD.to_owned(),
            frame_marker: DEFAULT_FRAME_MARKER.to_owned(),
            fingerprint_prefix_chars: DEFAULT_FINGERPRINT_PREFIX_CHARS,
            compact_threshold_bytes: DEFAULT_COMPACT_THRESHOLD_BYTES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
