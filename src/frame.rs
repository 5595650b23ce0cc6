// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Outbound frame decoding
//
// The consumer-side counterpart of the emitter: splits the outbound byte
// stream back into frames and parses envelopes out of them.

use crate::part::Envelope;

/// One decoded outbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameItem {
    Envelope(Envelope),
    /// Anything that is not a marker-prefixed envelope, such as a forwarded
    /// `[DONE]` sentinel or an upstream error line.
    Raw(String),
}

/// Incremental `<marker><json>\n\n` splitter.
#[derive(Debug)]
pub struct FrameDecoder {
    marker: String,
    pending: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            pending: Vec::new(),
        }
    }

    /// Append bytes and return every frame completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FrameItem> {
        self.pending.extend_from_slice(chunk);

        let mut items = Vec::new();
        let mut consumed = 0;
        while let Some(end) = find_separator(&self.pending[consumed..]) {
            let frame = &self.pending[consumed..consumed + end];
            if let Some(item) = self.decode(frame) {
                items.push(item);
            }
            consumed += end + 2;
        }
        self.pending.drain(..consumed);

        items
    }

    /// The stream ended; decode a final frame that lacked its separator.
    pub fn finish(&mut self) -> Option<FrameItem> {
        let rest = std::mem::take(&mut self.pending);
        self.decode(&rest)
    }

    fn decode(&self, frame: &[u8]) -> Option<FrameItem> {
        let text = String::from_utf8_lossy(frame);
        let text = text.trim_matches(|c| c == '\r' || c == '\n');
        if text.is_empty() {
            return None;
        }

        let Some(payload) = text.strip_prefix(self.marker.as_str()) else {
            return Some(FrameItem::Raw(text.to_owned()));
        };
        match serde_json::from_str::<Envelope>(payload) {
            Ok(envelope) => Some(FrameItem::Envelope(envelope)),
            Err(e) => {
                tracing::debug!(error = %e, "frame is not an envelope");
                Some(FrameItem::Raw(text.to_owned()))
            }
        }
    }
}

fn find_separator(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    #[test]
    fn decodes_split_frames() {
        let mut decoder = FrameDecoder::new("data: ");
        let wire = b"data: {\"content\":{\"parts\":[{\"text\":\"Hi\"}]},\"author\":\"planner\"}\n\ndata: [DONE]\n\n";

        let mut items = decoder.push(&wire[..20]);
        assert!(items.is_empty());
        items.extend(decoder.push(&wire[20..]));

        assert_eq!(
            items,
            vec![
                FrameItem::Envelope(Envelope::single("planner", Part::text("Hi"))),
                FrameItem::Raw("data: [DONE]".into()),
            ]
        );
    }

    #[test]
    fn separator_split_between_chunks() {
        let mut decoder = FrameDecoder::new("data: ");
        assert!(decoder.push(b"data: [DONE]\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec![FrameItem::Raw("data: [DONE]".into())]);
    }

    #[test]
    fn unterminated_frame_decoded_on_finish() {
        let mut decoder = FrameDecoder::new("data: ");
        assert!(decoder.push(br#"data: {"content":{"parts":[]},"author":"a"}"#).is_empty());
        match decoder.finish() {
            Some(FrameItem::Envelope(e)) => assert!(e.content.parts.is_empty()),
            other => panic!("expected envelope, got {other:?}"),
        }
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn non_envelope_json_is_raw() {
        let mut decoder = FrameDecoder::new("data: ");
        let items = decoder.push(b"data: {\"error\":\"quota\"}\n\n");
        assert_eq!(items, vec![FrameItem::Raw("data: {\"error\":\"quota\"}".into())]);
    }
}
