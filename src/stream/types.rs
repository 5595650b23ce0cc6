// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// The upstream wire formats, the outbound frame representation, and the
// producer capability both upstream formats implement.

use std::fmt;

use crate::part::Envelope;

// ---------------------------------------------------------------------------
// Upstream formats
// ---------------------------------------------------------------------------

/// How the upstream response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamFormat {
    /// The whole body is one cumulative JSON document with no framing
    /// relationship between chunks and tokens.
    GrowingDocument,
    /// Each line holds one complete JSON object, optionally behind a
    /// `data:` marker.
    LineDelimited,
}

impl UpstreamFormat {
    /// Pick a format from a response content type.
    ///
    /// SSE and NDJSON bodies are line-delimited; anything else (including a
    /// missing content type) is treated as a growing document.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return UpstreamFormat::GrowingDocument;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/event-stream" | "application/x-ndjson" | "application/jsonl" => {
                UpstreamFormat::LineDelimited
            }
            _ => UpstreamFormat::GrowingDocument,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamFormat::GrowingDocument => "growing_document",
            UpstreamFormat::LineDelimited => "line_delimited",
        }
    }
}

impl fmt::Display for UpstreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Outbound frames
// ---------------------------------------------------------------------------

/// One unit of the outbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A normalized envelope, serialized behind the frame marker.
    Envelope(Envelope),
    /// An upstream line that is not data, forwarded as-is.
    Passthrough(String),
}

// ---------------------------------------------------------------------------
// Producer capability
// ---------------------------------------------------------------------------

/// Turns raw upstream chunks into outbound frames.
///
/// One instance per upstream connection; implementations keep all of their
/// state (buffers, cursors, current author) on `self`.
pub trait EnvelopeProducer: Send {
    fn format(&self) -> UpstreamFormat;

    /// Consume one chunk and return the frames it completed, in order.
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// The upstream closed normally. Return anything still releasable.
    fn finish(&mut self) -> Vec<Frame>;
}
