// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

use sha2::{Digest, Sha256};

use super::defaults::DEFAULT_UPSTREAM_PATH;
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a turnstream config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA256 contract hash
/// 3. Parse YAML into raw deserialization types
/// 4. Resolve `${VAR}` interpolation in string fields
/// 5. Validate values and fill defaults
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let contract_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.turnstream != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported contract version \"{}\", expected \"v1\"",
            raw.turnstream
        )));
    }

    let upstream = build_upstream_config(raw.upstream)?;
    let stream = build_stream_settings(raw.stream.unwrap_or_default())?;

    Ok(Config {
        version: raw.turnstream,
        environment: raw.environment.unwrap_or_default(),
        upstream,
        stream,
        contract_hash,
    })
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_upstream_config(raw: raw::RawUpstreamConfig) -> Result<UpstreamConfig, ConfigError> {
    let base_url = resolve_variables(&raw.base_url)?;
    let base_url = base_url.trim().trim_end_matches('/').to_owned();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "upstream base_url \"{base_url}\" must start with http:// or https://"
        )));
    }

    let path = match raw.path {
        Some(p) => resolve_variables(&p)?,
        None => DEFAULT_UPSTREAM_PATH.to_owned(),
    };
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };

    let format = match raw.format.as_deref() {
        None => FormatSetting::Auto,
        Some(value) => FormatSetting::parse(value).ok_or_else(|| {
            ConfigError::Validation(format!(
                "unknown upstream format \"{value}\", expected \"auto\", \"growing_document\", or \"line_delimited\""
            ))
        })?,
    };

    if raw.timeout_ms == Some(0) {
        return Err(ConfigError::Validation(
            "upstream timeout_ms must be > 0".into(),
        ));
    }

    Ok(UpstreamConfig {
        base_url,
        path,
        format,
        timeout_ms: raw.timeout_ms,
    })
}

fn build_stream_settings(raw: raw::RawStreamConfig) -> Result<StreamSettings, ConfigError> {
    let defaults = StreamSettings::default();

    fn non_empty(name: &str, value: Option<String>, default: String) -> Result<String, ConfigError> {
        match value {
            None => Ok(default),
            Some(v) => {
                let v = resolve_variables(&v)?;
                if v.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "stream {name} must not be empty"
                    )));
                }
                Ok(v)
            }
        }
    }

    fn positive(name: &str, value: Option<usize>, default: usize) -> Result<usize, ConfigError> {
        match value {
            Some(0) => Err(ConfigError::Validation(format!("stream {name} must be > 0"))),
            Some(v) => Ok(v),
            None => Ok(default),
        }
    }

    let parts_field = non_empty("parts_field", raw.parts_field, defaults.parts_field)?;
    let author_field = non_empty("author_field", raw.author_field, defaults.author_field)?;
    for (name, field) in [("parts_field", &parts_field), ("author_field", &author_field)] {
        if field.contains('"') || field.contains('\\') {
            return Err(ConfigError::Validation(format!(
                "stream {name} \"{field}\" must not contain quotes or backslashes"
            )));
        }
    }

    Ok(StreamSettings {
        default_author: non_empty("default_author", raw.default_author, defaults.default_author)?,
        parts_field,
        author_field,
        // An empty marker is allowed: frames are then bare JSON.
        frame_marker: raw.frame_marker.unwrap_or(defaults.frame_marker),
        fingerprint_prefix_chars: positive(
            "fingerprint_prefix_chars",
            raw.fingerprint_prefix_chars,
            defaults.fingerprint_prefix_chars,
        )?,
        compact_threshold_bytes: raw
            .compact_threshold_bytes
            .unwrap_or(defaults.compact_threshold_bytes),
        channel_capacity: positive(
            "channel_capacity",
            raw.channel_capacity,
            defaults.channel_capacity,
        )?,
    })
}
