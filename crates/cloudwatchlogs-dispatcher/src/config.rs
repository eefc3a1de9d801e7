// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::str::FromStr;

pub const ENV_PREFIX: &str = "FLUENTBIT_CLOUDWATCHLOGS_PREFIX";
pub const ENV_CLUSTER: &str = "FLUENTBIT_CLOUDWATCHLOGS_CLUSTER";
pub const ENV_BATCH: &str = "FLUENTBIT_CLOUDWATCHLOGS_BATCH";
pub const ENV_DEBUG: &str = "FLUENTBIT_CLOUDWATCHLOGS_DEBUG";
pub const ENV_ADDR: &str = "FLUENTBIT_CLOUDWATCHLOGS_ADDR";
pub const ENV_ENDPOINT: &str = "FLUENTBIT_CLOUDWATCHLOGS_ENDPOINT";
pub const ENV_ON_FAILURE: &str = "FLUENTBIT_CLOUDWATCHLOGS_ON_FAILURE";
pub const ENV_LOG_LEVEL: &str = "FLUENTBIT_CLOUDWATCHLOGS_LOG_LEVEL";

const DEFAULT_BATCH_SIZE: usize = 256;
/// PutLogEvents accepts at most this many events per call.
pub const MAX_BATCH_SIZE: usize = 10_000;
const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// What a cycle does once one destination fails to provision or deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed destination.
    #[default]
    Abort,
    /// Keep delivering the remaining destinations, then report the failures.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(anyhow::anyhow!(
                "{ENV_ON_FAILURE} must be one of \"abort\" or \"continue\", got {other:?}"
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Continue => write!(f, "continue"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// first segment of every generated log group name
    pub prefix: String,
    /// cluster this process runs in, second segment of generated group names
    pub cluster: String,
    /// maximum number of events per PutLogEvents call
    pub batch_size: NonZeroUsize,
    pub debug: bool,
    pub addr: SocketAddr,
    /// replaces the regional CloudWatch Logs endpoint, for VPC endpoints and local stacks
    pub cloudwatch_endpoint: Option<String>,
    pub failure_policy: FailurePolicy,
    pub max_request_content_length: usize,
    /// timeout for each CloudWatch Logs request, in seconds
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn new() -> Result<Config, Box<dyn std::error::Error>> {
        let prefix = required_var(ENV_PREFIX)?;
        let cluster = required_var(ENV_CLUSTER)?;

        let batch_size = match env::var(ENV_BATCH) {
            Ok(val) => parse_batch_size(&val)?,
            Err(_) => NonZeroUsize::MIN.saturating_add(DEFAULT_BATCH_SIZE - 1),
        };

        let debug = debug_enabled();

        let addr_string = env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
        let addr = addr_string.parse::<SocketAddr>().map_err(|err| {
            anyhow::anyhow!("{ENV_ADDR} is not a valid socket address ({addr_string}): {err}")
        })?;

        let cloudwatch_endpoint = env::var(ENV_ENDPOINT)
            .ok()
            .map(|endpoint| endpoint.trim().trim_end_matches('/').to_string())
            .filter(|endpoint| !endpoint.is_empty());

        let failure_policy = match env::var(ENV_ON_FAILURE) {
            Ok(val) => val.parse::<FailurePolicy>()?,
            Err(_) => FailurePolicy::default(),
        };

        Ok(Config {
            prefix,
            cluster,
            batch_size,
            debug,
            addr,
            cloudwatch_endpoint,
            failure_policy,
            max_request_content_length: 10 * 1024 * 1024, // 10MB in Bytes
            request_timeout_secs: 30,
        })
    }
}

fn debug_enabled() -> bool {
    env::var(ENV_DEBUG)
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

/// Filter level for the log subscriber, read before the rest of the config so that
/// configuration errors are logged too. The debug flag forces `debug`.
pub fn log_level() -> String {
    if debug_enabled() {
        return "debug".to_string();
    }
    env::var(ENV_LOG_LEVEL)
        .map(|val| val.trim().to_lowercase())
        .ok()
        .filter(|val| !val.is_empty())
        .unwrap_or_else(|| "info".to_string())
}

fn required_var(name: &str) -> Result<String, anyhow::Error> {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(anyhow::anyhow!("{name} environment variable is not set")),
    }
}

fn parse_batch_size(val: &str) -> Result<NonZeroUsize, anyhow::Error> {
    let size = val
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("{ENV_BATCH} must be a positive integer, got {val:?}"))?;
    NonZeroUsize::new(size)
        .filter(|size| size.get() <= MAX_BATCH_SIZE)
        .ok_or_else(|| {
            anyhow::anyhow!("{ENV_BATCH} must be between 1 and {MAX_BATCH_SIZE}, got {size}")
        })
}
