// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Part deduplication
//
// The growing document can repeat earlier parts verbatim. Each part gets a
// fingerprint over a bounded prefix of its content plus its flags, and only
// the first part with a given fingerprint is forwarded.
//
// Known limitation: two different parts whose content shares the whole
// prefix and whose flags match are treated as the same part.

use std::collections::HashSet;

use crate::part::{Part, PartPayload};

/// Deduplication key for a part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    prefix: String,
    thought: bool,
    function_call: bool,
}

impl Fingerprint {
    /// Fingerprint `part`, keeping at most `prefix_chars` characters of content.
    ///
    /// Text parts use their text. Function parts have no text, so their
    /// serialized descriptor (name, id, arguments or response) stands in.
    pub fn of(part: &Part, prefix_chars: usize) -> Self {
        let prefix = match &part.payload {
            PartPayload::Text(text) => text.chars().take(prefix_chars).collect(),
            PartPayload::FunctionCall(call) => descriptor_prefix("call", call, prefix_chars),
            PartPayload::FunctionResponse(resp) => descriptor_prefix("response", resp, prefix_chars),
        };
        Self {
            prefix,
            thought: part.thought,
            function_call: part.is_function_call(),
        }
    }
}

fn descriptor_prefix(kind: &str, descriptor: &impl serde::Serialize, prefix_chars: usize) -> String {
    let rendered = serde_json::to_string(descriptor).unwrap_or_default();
    format!("{kind}:{rendered}").chars().take(prefix_chars).collect()
}

/// Per-connection set of already forwarded fingerprints.
#[derive(Debug)]
pub struct PartDeduplicator {
    seen: HashSet<Fingerprint>,
    prefix_chars: usize,
}

impl PartDeduplicator {
    pub fn new(prefix_chars: usize) -> Self {
        Self {
            seen: HashSet::new(),
            prefix_chars,
        }
    }

    /// Record the part and report whether it is new.
    pub fn accept(&mut self, part: &Part) -> bool {
        self.seen.insert(Fingerprint::of(part, self.prefix_chars))
    }

    /// Number of distinct parts forwarded so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
