// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory log store that records everything it is sent

use async_trait::async_trait;
use cloudwatchlogs_dispatcher::aggregator::LogEvent;
use cloudwatchlogs_dispatcher::destination::Destination;
use cloudwatchlogs_dispatcher::sink::{
    CreateError, LogSink, PutEventsError, SequenceToken, SinkError,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredEvent {
    pub timestamp_millis: i64,
    pub message: String,
}

#[derive(Default)]
struct State {
    groups: HashSet<String>,
    streams: HashSet<(String, String)>,
    events: BTreeMap<Destination, Vec<StoredEvent>>,
    tokens: BTreeMap<Destination, u64>,
    put_calls: usize,
    stale_rejections: usize,
}

/// Behaves like CloudWatch Logs for the calls the dispatcher makes: resources must exist
/// before they are written to, creating one twice is `AlreadyExists`, and every stream
/// hands out sequence tokens.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<State>,
    fail_groups: HashSet<String>,
    /// streams whose current token is replaced behind the writer's back once
    contended_streams: Mutex<HashSet<Destination>>,
}

impl RecordingSink {
    pub fn failing_group(group: &str) -> Self {
        RecordingSink {
            fail_groups: HashSet::from([group.to_string()]),
            ..Default::default()
        }
    }

    /// The next put to `destination` finds another writer got there first.
    pub fn contend_once(&self, destination: Destination) {
        self.contended_streams.lock().unwrap().insert(destination);
    }

    pub fn events(&self, destination: &Destination) -> Vec<StoredEvent> {
        self.state
            .lock()
            .unwrap()
            .events
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.state.lock().unwrap().events.keys().cloned().collect()
    }

    pub fn put_calls(&self) -> usize {
        self.state.lock().unwrap().put_calls
    }

    pub fn stale_rejections(&self) -> usize {
        self.state.lock().unwrap().stale_rejections
    }
}

fn token_for(counter: u64) -> SequenceToken {
    SequenceToken::from(format!("{counter:056}"))
}

#[async_trait]
impl LogSink for RecordingSink {
    async fn create_group(&self, group: &str) -> Result<(), CreateError> {
        if self.fail_groups.contains(group) {
            return Err(CreateError::Sink(SinkError::Service {
                status: 400,
                code: "AccessDeniedException".to_string(),
                message: format!("not allowed to create {group}"),
            }));
        }
        if self.state.lock().unwrap().groups.insert(group.to_string()) {
            Ok(())
        } else {
            Err(CreateError::AlreadyExists)
        }
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), CreateError> {
        let mut state = self.state.lock().unwrap();
        if !state.groups.contains(group) {
            return Err(CreateError::Sink(SinkError::Service {
                status: 400,
                code: "ResourceNotFoundException".to_string(),
                message: format!("group {group} does not exist"),
            }));
        }
        if state.streams.insert((group.to_string(), stream.to_string())) {
            Ok(())
        } else {
            Err(CreateError::AlreadyExists)
        }
    }

    async fn put_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, PutEventsError> {
        let mut state = self.state.lock().unwrap();
        state.put_calls += 1;

        let key = (destination.group.clone(), destination.stream.clone());
        if !state.streams.contains(&key) {
            return Err(PutEventsError::Sink(SinkError::Service {
                status: 400,
                code: "ResourceNotFoundException".to_string(),
                message: format!("stream {destination} does not exist"),
            }));
        }

        if self.contended_streams.lock().unwrap().remove(destination) {
            *state.tokens.entry(destination.clone()).or_default() += 1;
        }

        let current = state.tokens.get(destination).copied();
        let expected = current.map(token_for);
        if token != expected.as_ref() {
            state.stale_rejections += 1;
            return Err(PutEventsError::StaleToken { expected });
        }

        let stored = events.iter().map(|event| StoredEvent {
            timestamp_millis: event.timestamp_millis,
            message: event.message.clone(),
        });
        state
            .events
            .entry(destination.clone())
            .or_default()
            .extend(stored);

        let next = current.unwrap_or(0) + 1;
        state.tokens.insert(destination.clone(), next);
        Ok(Some(token_for(next)))
    }
}
