// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Client accumulator and termination detector
//
// Consumes the outbound envelope stream for one or more in-flight messages.
// Plain text parts are concatenated into the message body. A text part equal
// to everything accumulated so far is the upstream's end-of-message echo and
// is discarded. Thoughts, function calls, function results and metadata go
// to a side-channel timeline and never touch the body.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::frame::{FrameDecoder, FrameItem};
use crate::part::{Envelope, Part};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle of one message. No transition leaves `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Accumulating,
    Terminated,
}

/// Accumulated state for a single message.
#[derive(Debug, Clone)]
pub struct MessageState {
    pub message_id: String,
    pub accumulated_text: String,
    /// Author of the most recent envelope applied.
    pub current_agent: Option<String>,
    pub phase: Phase,
    pub updated_at: DateTime<Utc>,
}

impl MessageState {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            accumulated_text: String::new(),
            current_agent: None,
            phase: Phase::Empty,
            updated_at: Utc::now(),
        }
    }

    /// Whether `text` is the termination echo for this message.
    pub fn is_echo(&self, text: &str) -> bool {
        !self.accumulated_text.is_empty() && self.accumulated_text == text
    }
}

/// What the consumer should render or record.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorEvent {
    /// The message body changed; `text` is the full body so far.
    Display {
        message_id: String,
        author: String,
        text: String,
    },
    /// A thought, function call or function result.
    Timeline {
        message_id: String,
        author: String,
        part: Part,
    },
    /// Usage metadata or agent actions attached to an envelope.
    Metadata {
        message_id: String,
        author: String,
        usage_metadata: Option<Value>,
        actions: Option<Value>,
    },
    /// The frame stream ended; `text` is the final body.
    Closed { message_id: String, text: String },
}

// ---------------------------------------------------------------------------
// ClientAccumulator
// ---------------------------------------------------------------------------

/// Per-message accumulation, safe to share across tasks.
///
/// Frames for one message must be applied in arrival order.
#[derive(Debug, Default)]
pub struct ClientAccumulator {
    messages: DashMap<String, MessageState>,
}

impl ClientAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every part of `envelope` to `message_id`, in order.
    pub fn apply(&self, message_id: &str, envelope: &Envelope) -> Vec<AccumulatorEvent> {
        let mut events = Vec::new();

        for part in &envelope.content.parts {
            match part.as_text() {
                Some(text) if !part.thought => {
                    events.extend(self.apply_text(message_id, &envelope.author, text));
                }
                _ => {
                    self.touch(message_id, &envelope.author);
                    events.push(AccumulatorEvent::Timeline {
                        message_id: message_id.to_owned(),
                        author: envelope.author.clone(),
                        part: part.clone(),
                    });
                }
            }
        }

        if envelope.usage_metadata.is_some() || envelope.actions.is_some() {
            self.touch(message_id, &envelope.author);
            events.push(AccumulatorEvent::Metadata {
                message_id: message_id.to_owned(),
                author: envelope.author.clone(),
                usage_metadata: envelope.usage_metadata.clone(),
                actions: envelope.actions.clone(),
            });
        }

        events
    }

    /// Apply one plain text increment. Returns the display update, or `None`
    /// when the increment was an echo or the message is already terminated.
    pub fn apply_text(&self, message_id: &str, author: &str, text: &str) -> Option<AccumulatorEvent> {
        let mut entry = self
            .messages
            .entry(message_id.to_owned())
            .or_insert_with(|| MessageState::new(message_id));
        let state = entry.value_mut();
        state.current_agent = Some(author.to_owned());
        state.updated_at = Utc::now();

        match state.phase {
            Phase::Terminated => {
                tracing::debug!(message_id, "text after termination ignored");
                None
            }
            _ if state.is_echo(text) => {
                tracing::debug!(message_id, len = text.len(), "termination echo");
                state.phase = Phase::Terminated;
                None
            }
            _ => {
                state.accumulated_text.push_str(text);
                state.phase = Phase::Accumulating;
                Some(AccumulatorEvent::Display {
                    message_id: message_id.to_owned(),
                    author: author.to_owned(),
                    text: state.accumulated_text.clone(),
                })
            }
        }
    }

    /// The stream for `message_id` closed. Returns the final text.
    pub fn close(&self, message_id: &str) -> String {
        let mut entry = self
            .messages
            .entry(message_id.to_owned())
            .or_insert_with(|| MessageState::new(message_id));
        let state = entry.value_mut();
        state.phase = Phase::Terminated;
        state.updated_at = Utc::now();
        state.accumulated_text.clone()
    }

    pub fn state(&self, message_id: &str) -> Option<MessageState> {
        self.messages.get(message_id).map(|entry| entry.value().clone())
    }

    pub fn text(&self, message_id: &str) -> Option<String> {
        self.messages
            .get(message_id)
            .map(|entry| entry.accumulated_text.clone())
    }

    /// Drop terminated messages not updated within `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let now = Utc::now();
        self.messages.retain(|_, state| {
            let age = now
                .signed_duration_since(state.updated_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            state.phase != Phase::Terminated || age <= max_age
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn touch(&self, message_id: &str, author: &str) {
        let mut entry = self
            .messages
            .entry(message_id.to_owned())
            .or_insert_with(|| MessageState::new(message_id));
        entry.current_agent = Some(author.to_owned());
        entry.updated_at = Utc::now();
    }

    /// Drive an outbound frame byte stream into events for `message_id`.
    ///
    /// Ends with a `Closed` event whether the stream finished normally or
    /// failed; a failure loses only the frame in flight.
    pub fn follow<E>(
        self: &Arc<Self>,
        message_id: impl Into<String>,
        mut input: impl Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
        marker: &str,
        capacity: usize,
    ) -> impl Stream<Item = AccumulatorEvent>
    where
        E: Display + Send + 'static,
    {
        let accumulator = Arc::clone(self);
        let message_id = message_id.into();
        let mut decoder = FrameDecoder::new(marker);
        let (tx, rx) = mpsc::channel::<AccumulatorEvent>(capacity.max(1));

        tokio::spawn(async move {
            let mut failed = false;
            while let Some(item) = input.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(message_id = %message_id, error = %e, "frame stream aborted");
                        failed = true;
                        break;
                    }
                };
                for frame in decoder.push(&chunk) {
                    if !forward(&accumulator, &message_id, frame, &tx).await {
                        return;
                    }
                }
            }

            if !failed {
                if let Some(frame) = decoder.finish() {
                    if !forward(&accumulator, &message_id, frame, &tx).await {
                        return;
                    }
                }
            }

            let text = accumulator.close(&message_id);
            let _ = tx.send(AccumulatorEvent::Closed { message_id, text }).await;
        });

        ReceiverStream::new(rx)
    }
}

/// Apply one decoded frame and send its events. `false` once the receiver
/// is gone.
async fn forward(
    accumulator: &ClientAccumulator,
    message_id: &str,
    frame: FrameItem,
    tx: &mpsc::Sender<AccumulatorEvent>,
) -> bool {
    let envelope = match frame {
        FrameItem::Envelope(envelope) => envelope,
        FrameItem::Raw(raw) => {
            tracing::trace!(message_id, len = raw.len(), "skipping non-envelope frame");
            return true;
        }
    };
    for event in accumulator.apply(message_id, &envelope) {
        if tx.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::convert::Infallible;

    fn text_envelope(author: &str, text: &str) -> Envelope {
        Envelope::single(author, Part::text(text))
    }

    fn display_text(event: &AccumulatorEvent) -> &str {
        match event {
            AccumulatorEvent::Display { text, .. } => text,
            other => panic!("expected display event, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Echo rule
    // ---------------------------------------------------------------

    #[test]
    fn hello_world_echo_is_discarded() {
        let acc = ClientAccumulator::new();
        acc.apply_text("m1", "planner", "Hello");
        acc.apply_text("m1", "planner", " world");
        assert_eq!(acc.text("m1").as_deref(), Some("Hello world"));

        assert_eq!(acc.apply_text("m1", "planner", "Hello world"), None);
        assert_eq!(acc.text("m1").as_deref(), Some("Hello world"));
        assert_eq!(acc.state("m1").unwrap().phase, Phase::Terminated);
    }

    #[test]
    fn non_equal_text_appends_and_updates() {
        let acc = ClientAccumulator::new();
        acc.apply_text("m1", "planner", "Hello world");
        let event = acc.apply_text("m1", "planner", "Hello world!").unwrap();
        assert_eq!(display_text(&event), "Hello worldHello world!");
    }

    #[test]
    fn repeated_single_letter_is_echo() {
        let acc = ClientAccumulator::new();
        let first = acc.apply_text("m1", "a", "A").unwrap();
        assert_eq!(display_text(&first), "A");
        assert_eq!(acc.apply_text("m1", "a", "A"), None);
        assert_eq!(acc.text("m1").as_deref(), Some("A"));
    }

    #[test]
    fn empty_accumulation_never_matches_echo() {
        let acc = ClientAccumulator::new();
        let event = acc.apply_text("m1", "a", "").unwrap();
        assert_eq!(display_text(&event), "");
        assert_eq!(acc.state("m1").unwrap().phase, Phase::Accumulating);
    }

    #[test]
    fn no_transition_leaves_terminated() {
        let acc = ClientAccumulator::new();
        acc.apply_text("m1", "a", "x");
        acc.close("m1");
        assert_eq!(acc.apply_text("m1", "a", "more"), None);
        assert_eq!(acc.text("m1").as_deref(), Some("x"));
    }

    #[test]
    fn messages_are_independent() {
        let acc = ClientAccumulator::new();
        acc.apply_text("m1", "a", "one");
        acc.apply_text("m2", "a", "one");
        assert_eq!(acc.state("m1").unwrap().phase, Phase::Accumulating);
        assert_eq!(acc.state("m2").unwrap().phase, Phase::Accumulating);
        assert_eq!(acc.len(), 2);
    }

    // ---------------------------------------------------------------
    // Timeline side channel
    // ---------------------------------------------------------------

    #[test]
    fn thoughts_and_calls_go_to_timeline() {
        let acc = ClientAccumulator::new();
        acc.apply("m1", &text_envelope("planner", "body"));

        let thought = Envelope::single("planner", Part::thought("body"));
        let events = acc.apply("m1", &thought);
        assert!(matches!(&events[..], [AccumulatorEvent::Timeline { part, .. }] if part.thought));

        let call = Envelope::single("planner", Part::function_call("load_memory", json!({}), None));
        let events = acc.apply("m1", &call);
        assert!(matches!(&events[..], [AccumulatorEvent::Timeline { .. }]));

        // Neither touched the body or the phase.
        let state = acc.state("m1").unwrap();
        assert_eq!(state.accumulated_text, "body");
        assert_eq!(state.phase, Phase::Accumulating);
    }

    #[test]
    fn timeline_still_flows_after_termination() {
        let acc = ClientAccumulator::new();
        acc.apply_text("m1", "a", "x");
        acc.close("m1");
        let events = acc.apply("m1", &Envelope::single("b", Part::thought("later")));
        assert_eq!(events.len(), 1);
        assert_eq!(acc.state("m1").unwrap().current_agent.as_deref(), Some("b"));
    }

    #[test]
    fn metadata_becomes_its_own_event() {
        let acc = ClientAccumulator::new();
        let mut envelope = text_envelope("planner", "hi");
        envelope.usage_metadata = Some(json!({"totalTokenCount": 4}));
        let events = acc.apply("m1", &envelope);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            AccumulatorEvent::Metadata { usage_metadata: Some(_), actions: None, .. }
        ));
    }

    // ---------------------------------------------------------------
    // Cleanup
    // ---------------------------------------------------------------

    #[test]
    fn cleanup_keeps_active_and_fresh_messages() {
        let acc = ClientAccumulator::new();
        acc.apply_text("active", "a", "x");
        acc.apply_text("done", "a", "y");
        acc.close("done");

        acc.cleanup(Duration::from_secs(3600));
        assert_eq!(acc.len(), 2);

        acc.cleanup(Duration::ZERO);
        assert!(acc.state("active").is_some());
    }

    #[test]
    fn cleanup_removes_stale_terminated() {
        let acc = ClientAccumulator::new();
        acc.close("old");
        if let Some(mut entry) = acc.messages.get_mut("old") {
            entry.updated_at = Utc::now() - chrono::Duration::hours(2);
        }
        acc.cleanup(Duration::from_secs(60));
        assert!(acc.is_empty());
    }

    // ---------------------------------------------------------------
    // follow
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn follow_accumulates_and_closes() {
        let acc = Arc::new(ClientAccumulator::new());
        let wire: Vec<Result<Bytes, Infallible>> = vec![
            Ok(Bytes::from_static(b"data: {\"content\":{\"parts\":[{\"text\":\"A\"}]},\"author\":\"p\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"content\":{\"parts\":[{\"thought\":true,\"text\":\"t\"}]},\"author\":\"p\"}\n\n")),
            Ok(Bytes::from_static(b"data: {\"content\":{\"parts\":[{\"text\":\"A\"}]},\"author\":\"p\"}\n\ndata: [DONE]\n\n")),
        ];

        let events: Vec<_> = acc
            .follow("m1", tokio_stream::iter(wire), "data: ", 8)
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(display_text(&events[0]), "A");
        assert!(matches!(events[1], AccumulatorEvent::Timeline { .. }));
        assert_eq!(
            events[2],
            AccumulatorEvent::Closed {
                message_id: "m1".into(),
                text: "A".into()
            }
        );
        assert_eq!(acc.state("m1").unwrap().phase, Phase::Terminated);
    }

    #[tokio::test]
    async fn follow_closes_on_stream_error() {
        let acc = Arc::new(ClientAccumulator::new());
        let wire = vec![
            Ok(Bytes::from_static(b"data: {\"content\":{\"parts\":[{\"text\":\"partial\"}]},\"author\":\"p\"}\n\n")),
            Err("reset"),
        ];

        let events: Vec<_> = acc
            .follow("m1", tokio_stream::iter(wire), "data: ", 8)
            .collect()
            .await;

        assert_eq!(
            events.last(),
            Some(&AccumulatorEvent::Closed {
                message_id: "m1".into(),
                text: "partial".into()
            })
        );
    }
}
