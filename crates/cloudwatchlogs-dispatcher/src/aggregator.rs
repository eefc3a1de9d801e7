// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-cycle grouping of accepted lines by destination.
//!
//! Lines are kept as `group -> stream -> events` with events in arrival order.
//! CloudWatch Logs orders events within a stream by submission, so the order
//! in which [`BatchAggregator::add`] is called is the order they are delivered.
//!
//! An aggregator lives for exactly one flush cycle and is never shared.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::destination::Destination;

/// A single event as submitted to PutLogEvents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
    pub message: String,
}

impl LogEvent {
    pub fn new(timestamp_millis: i64, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp_millis,
            message: message.into(),
        }
    }
}

type Streams = BTreeMap<String, Vec<LogEvent>>;

/// Events grouped by log group, then log stream.
#[derive(Debug, Default)]
pub struct BatchAggregator {
    groups: BTreeMap<String, Streams>,
    len: usize,
}

impl BatchAggregator {
    pub fn add(&mut self, destination: Destination, event: LogEvent) {
        self.groups
            .entry(destination.group)
            .or_default()
            .entry(destination.stream)
            .or_default()
            .push(event);
        self.len += 1;
    }

    /// Total number of events held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn destinations(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }

    /// Hands over every destination with its events, ordered by group then stream.
    pub fn drain(self) -> Vec<(Destination, Vec<LogEvent>)> {
        self.groups
            .into_iter()
            .flat_map(|(group, streams)| {
                streams
                    .into_iter()
                    .map(move |(stream, events)| (Destination::new(group.clone(), stream), events))
            })
            .collect()
    }
}
