// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Streaming response reconstruction
//
// Responsibilities:
// - Find complete parts inside a growing JSON document that arrives in
//   arbitrary byte chunks (scanner, extractor)
// - Forward each logical part once (dedup)
// - Re-frame every part as its own envelope under the current author (emitter)
// - Accept already line-delimited upstreams through the same normalization
//   (reconciler)
// - Memory-bounded: consumed bytes are compacted away

mod dedup;
mod emitter;
mod extractor;
mod processor;
mod reconciler;
mod scanner;
mod types;

pub use dedup::{Fingerprint, PartDeduplicator};
pub use emitter::{EnvelopeEmitter, GrowingDocumentProducer};
pub use extractor::PartExtractor;
pub use processor::StreamProcessor;
pub use reconciler::LineDelimitedProducer;
pub use scanner::{ScanCursor, Span};
pub use types::{EnvelopeProducer, Frame, UpstreamFormat};
