// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Envelope normalizer and emitter
//
// Shared by both producers: wraps parts into single-part envelopes under the
// current author and serializes frames onto the wire. A document's root-level
// `usageMetadata` and `actions` always travel in one trailing envelope with
// an empty parts list, after every part envelope of that document.

use bytes::Bytes;
use serde_json::Value;

use super::dedup::PartDeduplicator;
use super::extractor::{PartExtractor, ACTIONS_FIELD, USAGE_METADATA_FIELD};
use super::types::{EnvelopeProducer, Frame, UpstreamFormat};
use crate::config::StreamSettings;
use crate::part::{Content, Envelope, Part};

#[derive(Debug, Clone)]
pub struct EnvelopeEmitter {
    default_author: String,
    marker: String,
    parts_field: String,
    author_field: String,
}

impl EnvelopeEmitter {
    pub fn new(settings: &StreamSettings) -> Self {
        Self {
            default_author: settings.default_author.clone(),
            marker: settings.frame_marker.clone(),
            parts_field: settings.parts_field.clone(),
            author_field: settings.author_field.clone(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// One envelope holding exactly `part`. Falls back to the default author.
    pub fn envelope(&self, part: Part, author: Option<&str>) -> Envelope {
        Envelope::single(author.unwrap_or(&self.default_author), part)
    }

    /// The author named at the top level of a complete document, if any.
    pub fn author_of<'a>(&self, document: &'a Value) -> Option<&'a str> {
        document.get(&self.author_field).and_then(Value::as_str)
    }

    /// The trailing metadata envelope, or `None` when there is nothing to carry.
    pub fn metadata_envelope(
        &self,
        author: Option<&str>,
        usage_metadata: Option<Value>,
        actions: Option<Value>,
    ) -> Option<Envelope> {
        if usage_metadata.is_none() && actions.is_none() {
            return None;
        }
        Some(Envelope {
            content: Content::default(),
            author: author.unwrap_or(&self.default_author).to_owned(),
            usage_metadata,
            actions,
        })
    }

    /// Normalize one complete upstream document into envelopes: one per
    /// recognizable part, then the metadata envelope if there is one.
    pub fn envelopes_from_document(&self, document: &Value) -> Vec<Envelope> {
        let author = self.author_of(document);
        let mut envelopes: Vec<Envelope> = document
            .get("content")
            .and_then(|content| content.get(&self.parts_field))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Part::from_value)
                    .map(|part| self.envelope(part, author))
                    .collect()
            })
            .unwrap_or_default();

        envelopes.extend(self.metadata_envelope(
            author,
            non_null(document.get(USAGE_METADATA_FIELD)),
            non_null(document.get(ACTIONS_FIELD)),
        ));
        envelopes
    }

    /// Wire bytes for one frame. `None` only if the envelope cannot be
    /// serialized, which is logged and the frame skipped.
    pub fn encode(&self, frame: &Frame) -> Option<Bytes> {
        match frame {
            Frame::Envelope(envelope) => match serde_json::to_string(envelope) {
                Ok(json) => Some(Bytes::from(format!("{}{json}\n\n", self.marker))),
                Err(e) => {
                    tracing::warn!(author = %envelope.author, error = %e, "failed to encode envelope");
                    None
                }
            },
            Frame::Passthrough(line) => Some(Bytes::from(format!("{line}\n\n"))),
        }
    }
}

fn non_null(value: Option<&Value>) -> Option<Value> {
    value.filter(|v| !v.is_null()).cloned()
}

// ---------------------------------------------------------------------------
// Growing-document producer
// ---------------------------------------------------------------------------

/// Scanner, extractor, deduplicator and emitter wired together for one
/// upstream connection that streams a single growing JSON document.
#[derive(Debug)]
pub struct GrowingDocumentProducer {
    extractor: PartExtractor,
    dedup: PartDeduplicator,
    emitter: EnvelopeEmitter,
    emitted: usize,
    metadata_released: bool,
}

impl GrowingDocumentProducer {
    pub fn new(settings: &StreamSettings) -> Self {
        Self {
            extractor: PartExtractor::new(
                &settings.parts_field,
                &settings.author_field,
                settings.compact_threshold_bytes,
            ),
            dedup: PartDeduplicator::new(settings.fingerprint_prefix_chars),
            emitter: EnvelopeEmitter::new(settings),
            emitted: 0,
            metadata_released: false,
        }
    }

    pub fn current_author(&self) -> Option<&str> {
        self.extractor.author()
    }

    /// Release the metadata envelope at most once per connection.
    fn release_metadata(&mut self) -> Option<Frame> {
        if self.metadata_released {
            return None;
        }
        let (usage_metadata, actions) = self.extractor.take_metadata();
        let envelope = self
            .emitter
            .metadata_envelope(self.extractor.author(), usage_metadata, actions)?;
        self.metadata_released = true;
        Some(Frame::Envelope(envelope))
    }
}

impl EnvelopeProducer for GrowingDocumentProducer {
    fn format(&self) -> UpstreamFormat {
        UpstreamFormat::GrowingDocument
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let parts = self.extractor.push(chunk);
        let mut frames = Vec::with_capacity(parts.len());

        for part in parts {
            if !self.dedup.accept(&part) {
                tracing::trace!("dropping repeated part");
                continue;
            }
            let envelope = self.emitter.envelope(part, self.extractor.author());
            frames.push(Frame::Envelope(envelope));
        }
        if self.extractor.is_document_closed() {
            frames.extend(self.release_metadata());
        }

        self.emitted += frames.len();
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        if self.extractor.has_pending_part() {
            tracing::debug!(
                buffered = self.extractor.buffered_len(),
                "upstream closed inside a part, discarding it"
            );
        }
        if !self.extractor.is_positioned() {
            tracing::debug!("upstream closed before a parts array appeared");
        }
        let frames: Vec<Frame> = self.release_metadata().into_iter().collect();
        self.emitted += frames.len();
        tracing::debug!(envelopes = self.emitted, distinct = self.dedup.len(), "growing document finished");
        frames
    }
}
