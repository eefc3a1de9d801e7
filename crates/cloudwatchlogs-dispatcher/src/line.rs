// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of the JSON payloads Fluent Bit's `http` output sends on flush.
//!
//! The body is a JSON array of records. Each record carries the log text, a
//! timestamp and the Kubernetes metadata added by Fluent Bit's `kubernetes`
//! filter:
//!
//! ```json
//! [
//!   {
//!     "timestamp": "2024-03-01T10:00:00.123Z",
//!     "log": "hello",
//!     "kubernetes": {
//!       "namespace_name": "ns",
//!       "pod_name": "pod1",
//!       "container_name": "c",
//!       "annotations": { "fluentbit.skpr.io/project": "p" }
//!     }
//!   }
//! ]
//! ```
//!
//! Timestamps are accepted either as RFC 3339 strings (`json_date_format iso8601`)
//! or as fractional epoch seconds (`json_date_format double`).

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
#[error("invalid Fluent Bit payload: {0}")]
pub struct ParseError(#[from] serde_json::Error);

/// One record as emitted by Fluent Bit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceLine {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub kubernetes: Kubernetes,
}

/// Kubernetes metadata which relates to a log line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Kubernetes {
    #[serde(default, rename = "namespace_name")]
    pub namespace: String,
    #[serde(default, rename = "pod_name")]
    pub pod: String,
    #[serde(default, rename = "container_name")]
    pub container: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Parses a flush request body into its records.
pub fn parse(body: &[u8]) -> Result<Vec<SourceLine>, ParseError> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Seconds(f64),
    Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| D::Error::custom(format!("invalid timestamp {text:?}: {err}"))),
        RawTimestamp::Seconds(seconds) => {
            if !seconds.is_finite() {
                return Err(D::Error::custom("timestamp is not a finite number"));
            }
            let millis = (seconds * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| D::Error::custom(format!("timestamp {seconds} is out of range")))
        }
    }
}
