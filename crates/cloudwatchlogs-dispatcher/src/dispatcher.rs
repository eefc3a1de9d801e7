// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::aggregator::{BatchAggregator, LogEvent};
use crate::config::{Config, FailurePolicy};
use crate::delivery::{DeliveryEngine, DeliveryError, DeliveryReport};
use crate::destination::{DestinationResolver, Resolution};
use crate::line::SourceLine;
use crate::provisioner::{ProvisionError, Provisioner};
use crate::sink::LogSink;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// lines received in the request
    pub lines: usize,
    /// lines dropped because their destination could not be resolved
    pub skipped: usize,
    pub delivered: Vec<DeliveryReport>,
}

impl CycleReport {
    pub fn delivered_events(&self) -> usize {
        self.delivered.iter().map(|d| d.events).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("{failed} of {total} destinations failed, first error: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: Box<CycleError>,
        report: CycleReport,
    },
}

/// Runs one resolve, aggregate, provision and deliver cycle for a batch of lines.
///
/// A `Dispatcher` is not meant to be called concurrently, see
/// [`crate::dispatcher_service::DispatcherService`] which owns it.
pub struct Dispatcher {
    sink: Arc<dyn LogSink + Send + Sync>,
    resolver: DestinationResolver,
    chunk_size: NonZeroUsize,
    failure_policy: FailurePolicy,
    debug: bool,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn LogSink + Send + Sync>, config: &Config) -> Self {
        Dispatcher {
            sink,
            resolver: DestinationResolver::new(&config.prefix, &config.cluster),
            chunk_size: config.batch_size,
            failure_policy: config.failure_policy,
            debug: config.debug,
        }
    }

    pub async fn run_cycle(&self, lines: Vec<SourceLine>) -> Result<CycleReport, CycleError> {
        let time = Instant::now();
        let mut report = CycleReport {
            lines: lines.len(),
            ..Default::default()
        };

        let mut aggregator = BatchAggregator::default();
        for line in lines {
            match self.resolver.resolve(&line.kubernetes) {
                Resolution::Accept(destination) => aggregator.add(
                    destination,
                    LogEvent::new(line.timestamp.timestamp_millis(), line.log),
                ),
                Resolution::Skip(reason) => {
                    report.skipped += 1;
                    if self.debug {
                        debug!(
                            "DISPATCH | Skipping {}/{} because: {reason}",
                            line.kubernetes.namespace, line.kubernetes.pod
                        );
                    }
                }
            }
        }

        let total = aggregator.destinations();
        let mut provisioner = Provisioner::new(self.sink.as_ref());
        let engine = DeliveryEngine::new(self.sink.as_ref(), self.chunk_size);
        let mut failures: Vec<CycleError> = Vec::new();

        for (destination, events) in aggregator.drain() {
            if self.debug {
                debug!(
                    "DISPATCH | Pushing {} logs for {destination}",
                    events.len()
                );
            }

            let result = match provisioner.ensure(&destination).await {
                Ok(()) => engine
                    .deliver(&destination, &events)
                    .await
                    .map_err(CycleError::from),
                Err(err) => Err(CycleError::from(err)),
            };

            match result {
                Ok(delivered) => report.delivered.push(delivered),
                Err(err) => {
                    error!("DISPATCH | {err}");
                    match self.failure_policy {
                        FailurePolicy::Abort => return Err(err),
                        FailurePolicy::Continue => failures.push(err),
                    }
                }
            }
        }

        if !failures.is_empty() {
            let failed = failures.len();
            let first = failures.swap_remove(0);
            return Err(CycleError::Partial {
                failed,
                total,
                first: Box::new(first),
                report,
            });
        }

        info!(
            "DISPATCH | Delivered {} events to {} destinations in {} ms ({} lines skipped)",
            report.delivered_events(),
            report.delivered.len(),
            time.elapsed().as_millis(),
            report.skipped
        );
        Ok(report)
    }
}
