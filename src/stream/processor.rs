// Copyright 2026 The Turnstream Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Drives one upstream body through the producer for its format and turns
// the resulting frames into outbound bytes. Each connection gets its own
// task and producer; nothing is shared between connections.

use std::fmt::Display;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::Instrument;

use super::emitter::{EnvelopeEmitter, GrowingDocumentProducer};
use super::reconciler::LineDelimitedProducer;
use super::types::{EnvelopeProducer, UpstreamFormat};
use crate::config::StreamSettings;

/// Reconstructs a normalized envelope stream from an upstream body.
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    settings: StreamSettings,
}

impl StreamProcessor {
    pub fn new(settings: StreamSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// A fresh producer for one connection.
    pub fn producer(&self, format: UpstreamFormat) -> Box<dyn EnvelopeProducer> {
        match format {
            UpstreamFormat::GrowingDocument => Box::new(GrowingDocumentProducer::new(&self.settings)),
            UpstreamFormat::LineDelimited => Box::new(LineDelimitedProducer::new(&self.settings)),
        }
    }

    /// Process an upstream byte stream, producing outbound frame bytes.
    ///
    /// Every chunk is handled completely before the next is read. Frames go
    /// out through a bounded channel, so a slow consumer suspends reading
    /// from upstream. An upstream error ends the output without flushing
    /// partial data; a normal end flushes whatever the producer can still
    /// release. The task runs inside the caller's current span, so its log
    /// lines carry the caller's request context.
    pub fn process<E>(
        &self,
        format: UpstreamFormat,
        mut input: impl Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    ) -> impl Stream<Item = Bytes>
    where
        E: Display + Send + 'static,
    {
        let mut producer = self.producer(format);
        let emitter = EnvelopeEmitter::new(&self.settings);

        let (tx, rx) = mpsc::channel::<Bytes>(self.settings.channel_capacity.max(1));

        let task = async move {
            let mut sent = 0usize;
            let mut received = 0usize;

            while let Some(item) = input.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::warn!(%format, received, frames = sent, error = %e, "upstream stream aborted");
                        return;
                    }
                };
                received += chunk.len();

                for frame in producer.push(&chunk) {
                    let Some(bytes) = emitter.encode(&frame) else {
                        continue;
                    };
                    if tx.send(bytes).await.is_err() {
                        tracing::debug!(%format, frames = sent, "client disconnected");
                        return;
                    }
                    sent += 1;
                }
            }

            for frame in producer.finish() {
                let Some(bytes) = emitter.encode(&frame) else {
                    continue;
                };
                if tx.send(bytes).await.is_err() {
                    return;
                }
                sent += 1;
            }

            tracing::info!(%format, received, frames = sent, "upstream stream closed");
        };
        tokio::spawn(task.instrument(tracing::Span::current()));

        ReceiverStream::new(rx)
    }
}
