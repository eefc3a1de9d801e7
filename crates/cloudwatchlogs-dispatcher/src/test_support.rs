// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory [`LogSink`] for unit tests. Responses are scripted per call and
//! fall back to success when the script runs out.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::aggregator::LogEvent;
use crate::destination::Destination;
use crate::sink::{CreateError, LogSink, PutEventsError, SequenceToken, SinkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateGroup(String),
    CreateStream(String, String),
    PutEvents {
        destination: Destination,
        messages: Vec<String>,
        token: Option<String>,
    },
}

#[derive(Default)]
pub struct ScriptedSink {
    calls: Mutex<Vec<Call>>,
    group_results: Mutex<VecDeque<Result<(), CreateError>>>,
    stream_results: Mutex<VecDeque<Result<(), CreateError>>>,
    put_results: Mutex<VecDeque<Result<Option<SequenceToken>, PutEventsError>>>,
    put_delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

pub fn service_error(code: &str) -> SinkError {
    SinkError::Service {
        status: 400,
        code: code.to_string(),
        message: "scripted failure".to_string(),
    }
}

impl ScriptedSink {
    pub fn with_put_delay(delay: Duration) -> Self {
        ScriptedSink {
            put_delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn push_group_result(&self, result: Result<(), CreateError>) {
        self.group_results.lock().unwrap().push_back(result);
    }

    pub fn push_stream_result(&self, result: Result<(), CreateError>) {
        self.stream_results.lock().unwrap().push_back(result);
    }

    pub fn push_put_result(&self, result: Result<Option<SequenceToken>, PutEventsError>) {
        self.put_results.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::PutEvents { .. }))
            .collect()
    }

    pub fn max_concurrent_puts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for ScriptedSink {
    async fn create_group(&self, group: &str) -> Result<(), CreateError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::CreateGroup(group.to_string()));
        self.group_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), CreateError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::CreateStream(group.to_string(), stream.to_string()));
        self.stream_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn put_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, PutEventsError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let put_count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::PutEvents {
                destination: destination.clone(),
                messages: events.iter().map(|e| e.message.clone()).collect(),
                token: token.map(|t| t.to_string()),
            });
            calls
                .iter()
                .filter(|call| matches!(call, Call::PutEvents { .. }))
                .count()
        };

        if let Some(delay) = self.put_delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        self.put_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Some(SequenceToken::from(format!("token-{put_count}")))))
    }
}
