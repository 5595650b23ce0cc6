// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Incremental part extractor
//
// Owns the growing upstream buffer for one connection. Locates the parts
// array once, then hands every newly closed element to serde_json. A second
// scan follows the root object for the `author`, `usageMetadata` and
// `actions` fields, so keys nested inside parts never count.

use serde_json::Value;

use super::scanner::{find_bytes, match_field, quoted_key, FieldMatch, RootFieldScanner, ScanCursor, Span};
use crate::part::Part;

pub(crate) const USAGE_METADATA_FIELD: &str = "usageMetadata";
pub(crate) const ACTIONS_FIELD: &str = "actions";

const AUTHOR: usize = 0;
const USAGE_METADATA: usize = 1;
const ACTIONS: usize = 2;

/// Pulls complete parts out of a growing, not line-delimited JSON document.
#[derive(Debug)]
pub struct PartExtractor {
    buffer: Vec<u8>,
    parts_key: Vec<u8>,
    /// Set once the parts array has been located; never unset.
    positioned: bool,
    parts_search_from: usize,
    cursor: ScanCursor,
    root: RootFieldScanner,
    author: Option<String>,
    usage_metadata: Option<Value>,
    actions: Option<Value>,
    compact_threshold: usize,
}

impl PartExtractor {
    pub fn new(parts_field: &str, author_field: &str, compact_threshold: usize) -> Self {
        Self {
            buffer: Vec::new(),
            parts_key: quoted_key(parts_field),
            positioned: false,
            parts_search_from: 0,
            cursor: ScanCursor::default(),
            root: RootFieldScanner::new([author_field, USAGE_METADATA_FIELD, ACTIONS_FIELD]),
            author: None,
            usage_metadata: None,
            actions: None,
            compact_threshold,
        }
    }

    /// Most recent root-level author, if any has closed yet.
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Whether the parts array has been found.
    pub fn is_positioned(&self) -> bool {
        self.positioned
    }

    /// Whether a part has started but not yet closed.
    pub fn has_pending_part(&self) -> bool {
        self.cursor.has_open_object()
    }

    /// Whether the root object has closed.
    pub fn is_document_closed(&self) -> bool {
        self.root.closed_documents() > 0
    }

    /// Hand over the root-level `usageMetadata` and `actions` captured so
    /// far. Null values are never captured.
    pub fn take_metadata(&mut self) -> (Option<Value>, Option<Value>) {
        (self.usage_metadata.take(), self.actions.take())
    }

    /// Bytes currently retained.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append a chunk and return every part that closed inside it, in
    /// document order. Malformed elements are skipped; this never fails.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Part> {
        self.buffer.extend_from_slice(chunk);
        self.refresh_root_fields();

        if !self.positioned {
            match self.locate_parts_array() {
                Some(start) => {
                    self.positioned = true;
                    self.cursor = ScanCursor::at(start);
                    tracing::trace!(offset = start, "parts array located");
                }
                None => {
                    self.compact();
                    return Vec::new();
                }
            }
        }

        let spans = self.cursor.scan(&self.buffer);
        let parts = spans
            .into_iter()
            .filter_map(|span| self.parse_span(span))
            .collect();

        self.compact();
        parts
    }

    fn parse_span(&self, span: Span) -> Option<Part> {
        let value = match serde_json::from_slice::<Value>(span.slice(&self.buffer)) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(
                    start = span.start,
                    end = span.end,
                    error = %e,
                    "skipping malformed part"
                );
                return None;
            }
        };
        Part::from_value(&value)
    }

    /// Search for the parts array opener. Returns the position just past `[`.
    fn locate_parts_array(&mut self) -> Option<usize> {
        loop {
            let Some(key_pos) = find_bytes(&self.buffer, &self.parts_key, self.parts_search_from) else {
                // Keep enough tail to catch a key split across chunks.
                self.parts_search_from = self
                    .buffer
                    .len()
                    .saturating_sub(self.parts_key.len() - 1);
                return None;
            };
            match match_field(&self.buffer, key_pos, self.parts_key.len(), b'[') {
                FieldMatch::Complete(start) => return Some(start),
                FieldMatch::Incomplete => {
                    self.parts_search_from = key_pos;
                    return None;
                }
                FieldMatch::Mismatch => self.parts_search_from = key_pos + 1,
            }
        }
    }

    /// Apply every root-level field that has fully arrived since the last
    /// call. Runs before part extraction so parts closing in the same chunk
    /// see the newest author.
    fn refresh_root_fields(&mut self) {
        for field in self.root.scan(&self.buffer) {
            let raw = field.span.slice(&self.buffer);
            match field.field {
                AUTHOR => match serde_json::from_slice::<String>(raw) {
                    Ok(author) => self.author = Some(author),
                    Err(e) => tracing::debug!(error = %e, "skipping non-string author"),
                },
                USAGE_METADATA => self.usage_metadata = parse_metadata(raw, USAGE_METADATA_FIELD),
                ACTIONS => self.actions = parse_metadata(raw, ACTIONS_FIELD),
                _ => {}
            }
        }
    }

    /// Drop consumed bytes once they exceed the threshold. Nothing a later
    /// scan or search still needs is removed.
    fn compact(&mut self) {
        let scan_floor = if self.positioned {
            self.cursor.object_start.unwrap_or(self.cursor.offset)
        } else {
            self.parts_search_from
        };
        let keep_from = scan_floor.min(self.root.floor());

        if keep_from < self.compact_threshold || keep_from == 0 {
            return;
        }

        self.buffer.drain(..keep_from);
        if self.positioned {
            self.cursor.shift(keep_from);
        } else {
            self.parts_search_from -= keep_from;
        }
        self.root.shift(keep_from);
    }
}

fn parse_metadata(raw: &[u8], field: &str) -> Option<Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value) => Some(value).filter(|v| !v.is_null()),
        Err(e) => {
            tracing::debug!(field, error = %e, "skipping malformed root field");
            None
        }
    }
}
