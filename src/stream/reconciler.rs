// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Alternate-format reconciler
//
// Upstreams that already frame one JSON object per line need no scanner or
// deduplication. Each line is parsed on its own and normalized through the
// same emitter, so downstream sees identical envelopes for either format.

use serde_json::Value;

use super::emitter::EnvelopeEmitter;
use super::types::{EnvelopeProducer, Frame, UpstreamFormat};
use crate::config::StreamSettings;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug)]
pub struct LineDelimitedProducer {
    pending: Vec<u8>,
    emitter: EnvelopeEmitter,
    lines: usize,
}

impl LineDelimitedProducer {
    pub fn new(settings: &StreamSettings) -> Self {
        Self {
            pending: Vec::new(),
            emitter: EnvelopeEmitter::new(settings),
            lines: 0,
        }
    }

    fn process_line(&mut self, raw: &[u8]) -> Vec<Frame> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        self.lines += 1;

        let payload = strip_data_marker(line);
        let Some(payload) = payload else {
            // event:, id:, retry: and comments are not data
            return vec![Frame::Passthrough(line.to_owned())];
        };
        if payload == DONE_SENTINEL {
            return vec![Frame::Passthrough(line.to_owned())];
        }

        let document = match serde_json::from_str::<Value>(payload) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(
                    line = self.lines,
                    len = payload.len(),
                    error = %e,
                    "unparsable upstream line, forwarding verbatim"
                );
                return vec![Frame::Passthrough(line.to_owned())];
            }
        };

        let envelopes = self.emitter.envelopes_from_document(&document);
        if envelopes.is_empty() {
            return vec![Frame::Passthrough(line.to_owned())];
        }
        envelopes.into_iter().map(Frame::Envelope).collect()
    }
}

/// The JSON payload of a line, or `None` for SSE fields other than `data`.
/// A line that starts with neither a field name nor a marker is bare NDJSON.
fn strip_data_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("data:") {
        return Some(rest.strip_prefix(' ').unwrap_or(rest).trim());
    }
    if line.starts_with(':') || line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:") {
        return None;
    }
    Some(line)
}

impl EnvelopeProducer for LineDelimitedProducer {
    fn format(&self) -> UpstreamFormat {
        UpstreamFormat::LineDelimited
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(newline) = self.pending[consumed..].iter().position(|&b| b == b'\n') {
            let end = consumed + newline;
            let line = self.pending[consumed..end].to_vec();
            frames.extend(self.process_line(&line));
            consumed = end + 1;
        }
        self.pending.drain(..consumed);

        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.pending);
        let frames = self.process_line(&rest);
        tracing::debug!(lines = self.lines, "line-delimited upstream finished");
        frames
    }
}
