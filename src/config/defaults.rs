// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

/// Author used until the upstream document names one.
pub const DEFAULT_AUTHOR: &str = "astra";

pub const DEFAULT_PARTS_FIELD: &str = "parts";
pub const DEFAULT_AUTHOR_FIELD: &str = "author";

/// Prefix written before every outbound envelope.
pub const DEFAULT_FRAME_MARKER: &str = "data: ";

/// Characters of part content that participate in the dedup fingerprint.
pub const DEFAULT_FINGERPRINT_PREFIX_CHARS: usize = 100;

/// Consumed bytes kept before the extractor compacts its buffer.
pub const DEFAULT_COMPACT_THRESHOLD_BYTES: usize = 64 * 1024;

/// Outbound frames buffered per connection before the producer waits.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_UPSTREAM_PATH: &str = "/run_sse";
