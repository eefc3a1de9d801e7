// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::fmt;

use crate::aggregator::LogEvent;
use crate::destination::Destination;

/// Opaque continuation token for one log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceToken(String);

impl SequenceToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SequenceToken {
    fn from(token: String) -> Self {
        SequenceToken(token)
    }
}

impl From<&str> for SequenceToken {
    fn from(token: &str) -> Self {
        SequenceToken(token.to_string())
    }
}

impl fmt::Display for SequenceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A failure talking to the log store that carries no special meaning for the caller.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    Request(String),
    #[error("{code} ({status}): {message}")]
    Service {
        status: u16,
        code: String,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("resource already exists")]
    AlreadyExists,
    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, thiserror::Error)]
pub enum PutEventsError {
    /// Another writer appended first. `expected` is the token the store wants next.
    #[error("invalid sequence token, expected {expected:?}")]
    StaleToken { expected: Option<SequenceToken> },
    /// The same events were stored by an earlier call.
    #[error("events already accepted")]
    AlreadyAccepted { next: Option<SequenceToken> },
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Append-only log store with per-stream ordering.
#[async_trait]
pub trait LogSink {
    async fn create_group(&self, group: &str) -> Result<(), CreateError>;

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), CreateError>;

    /// Appends `events` in order. Returns the token for the next call, if the store issues one.
    async fn put_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, PutEventsError>;
}
