// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chunked, token-aware delivery of one destination's events.
//!
//! Events are split into contiguous chunks of at most `chunk_size` and put in
//! order. Each successful put yields the token for the next chunk. When the
//! store reports a stale token it also reports the token it expected, and the
//! same chunk is put once more with that token. A second stale rejection for
//! the same chunk is fatal, so a destination never costs more than two calls
//! per chunk.

use std::num::NonZeroUsize;
use std::time::Instant;
use tracing::{debug, warn};

use crate::aggregator::LogEvent;
use crate::destination::Destination;
use crate::sink::{LogSink, PutEventsError, SequenceToken, SinkError};

/// Number of times a chunk is resubmitted after a stale token rejection.
pub const MAX_STALE_TOKEN_RETRIES: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("sequence token for {destination} still stale after retrying chunk {chunk}")]
    StaleToken {
        destination: Destination,
        chunk: usize,
        expected: Option<SequenceToken>,
    },
    #[error("failed to put chunk {chunk} to {destination}: {source}")]
    Rejected {
        destination: Destination,
        chunk: usize,
        source: SinkError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub destination: Destination,
    pub events: usize,
    pub chunks: usize,
    pub retries: usize,
}

/// Splits `events` into contiguous chunks of at most `chunk_size` elements.
pub fn chunks(events: &[LogEvent], chunk_size: NonZeroUsize) -> std::slice::Chunks<'_, LogEvent> {
    events.chunks(chunk_size.get())
}

pub struct DeliveryEngine<'a> {
    sink: &'a (dyn LogSink + Send + Sync),
    chunk_size: NonZeroUsize,
}

impl<'a> DeliveryEngine<'a> {
    pub fn new(sink: &'a (dyn LogSink + Send + Sync), chunk_size: NonZeroUsize) -> Self {
        DeliveryEngine { sink, chunk_size }
    }

    pub async fn deliver(
        &self,
        destination: &Destination,
        events: &[LogEvent],
    ) -> Result<DeliveryReport, DeliveryError> {
        let time = Instant::now();
        let mut report = DeliveryReport {
            destination: destination.clone(),
            events: events.len(),
            chunks: 0,
            retries: 0,
        };

        // tokens never outlive a cycle, the store tells us if it wants one
        let mut token: Option<SequenceToken> = None;

        for (index, chunk) in chunks(events, self.chunk_size).enumerate() {
            token = self
                .put_chunk(destination, index, chunk, token, &mut report.retries)
                .await?;
            report.chunks += 1;
        }

        debug!(
            "DELIVERY | Pushed {} events in {} chunks to {destination} in {} ms",
            report.events,
            report.chunks,
            time.elapsed().as_millis()
        );
        Ok(report)
    }

    async fn put_chunk(
        &self,
        destination: &Destination,
        index: usize,
        chunk: &[LogEvent],
        mut token: Option<SequenceToken>,
        retries: &mut usize,
    ) -> Result<Option<SequenceToken>, DeliveryError> {
        let mut attempts = 0;

        loop {
            match self
                .sink
                .put_events(destination, chunk, token.as_ref())
                .await
            {
                Ok(next) => return Ok(next),
                Err(PutEventsError::AlreadyAccepted { next }) => {
                    debug!("DELIVERY | Chunk {index} for {destination} was already accepted");
                    return Ok(next);
                }
                Err(PutEventsError::StaleToken { expected }) if attempts < MAX_STALE_TOKEN_RETRIES => {
                    attempts += 1;
                    *retries += 1;
                    debug!(
                        "DELIVERY | Stale sequence token for {destination}, retrying chunk {index}"
                    );
                    token = expected;
                }
                Err(PutEventsError::StaleToken { expected }) => {
                    warn!(
                        "DELIVERY | Sequence token for {destination} still stale after {attempts} retry"
                    );
                    return Err(DeliveryError::StaleToken {
                        destination: destination.clone(),
                        chunk: index,
                        expected,
                    });
                }
                Err(PutEventsError::Sink(source)) => {
                    return Err(DeliveryError::Rejected {
                        destination: destination.clone(),
                        chunk: index,
                        source,
                    });
                }
            }
        }
    }
}
