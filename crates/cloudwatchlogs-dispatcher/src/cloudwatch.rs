// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogSink`] backed by the CloudWatch Logs API.
//!
//! Credentials and region come from the default AWS provider chain and the SDK signs every
//! request. SDK retries are off, the dispatcher owns the retry policy.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatchlogs::config::http::HttpResponse;
use aws_sdk_cloudwatchlogs::config::retry::RetryConfig;
use aws_sdk_cloudwatchlogs::config::timeout::TimeoutConfig;
use aws_sdk_cloudwatchlogs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudwatchlogs::operation::put_log_events::PutLogEventsError;
use aws_sdk_cloudwatchlogs::types::InputLogEvent;
use aws_sdk_cloudwatchlogs::Client;
use core::time::Duration;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, warn};

use crate::aggregator::LogEvent;
use crate::config::Config;
use crate::destination::Destination;
use crate::sink::{CreateError, LogSink, PutEventsError, SequenceToken, SinkError};

#[derive(Debug, Clone)]
pub struct CloudWatchLogsSink {
    client: Client,
}

impl CloudWatchLogsSink {
    /// Loads credentials and region from the environment. `config.cloudwatch_endpoint`
    /// replaces the regional endpoint when set.
    pub async fn new(config: &Config) -> Result<Self, Box<dyn Error>> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        if sdk_config.region().is_none() {
            return Err(anyhow::anyhow!(
                "Unable to determine the AWS region, set AWS_REGION or AWS_DEFAULT_REGION"
            )
            .into());
        }

        let mut builder = aws_sdk_cloudwatchlogs::config::Builder::from(&sdk_config)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(config.request_timeout_secs))
                    .build(),
            );
        if let Some(endpoint) = &config.cloudwatch_endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self::with_client(Client::from_conf(builder.build())))
    }

    pub fn with_client(client: Client) -> Self {
        CloudWatchLogsSink { client }
    }
}

/// Flattens an SDK failure that means nothing special to the dispatcher.
fn sink_error<E>(err: SdkError<E, HttpResponse>) -> SinkError
where
    E: ProvideErrorMetadata + Error + 'static,
{
    let status = err.raw_response().map(|resp| resp.status().as_u16());
    match (err.code(), status) {
        (Some(code), Some(status)) => SinkError::Service {
            status,
            code: code.to_string(),
            message: err.message().unwrap_or_default().to_string(),
        },
        _ => SinkError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl LogSink for CloudWatchLogsSink {
    async fn create_group(&self, group: &str) -> Result<(), CreateError> {
        let time = Instant::now();
        let result = self
            .client
            .create_log_group()
            .log_group_name(group)
            .send()
            .await;
        debug!("CreateLogGroup took {} ms", time.elapsed().as_millis());

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception()) =>
            {
                Err(CreateError::AlreadyExists)
            }
            Err(err) => Err(CreateError::Sink(sink_error(err))),
        }
    }

    async fn create_stream(&self, group: &str, stream: &str) -> Result<(), CreateError> {
        let time = Instant::now();
        let result = self
            .client
            .create_log_stream()
            .log_group_name(group)
            .log_stream_name(stream)
            .send()
            .await;
        debug!("CreateLogStream took {} ms", time.elapsed().as_millis());

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_already_exists_exception()) =>
            {
                Err(CreateError::AlreadyExists)
            }
            Err(err) => Err(CreateError::Sink(sink_error(err))),
        }
    }

    async fn put_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        token: Option<&SequenceToken>,
    ) -> Result<Option<SequenceToken>, PutEventsError> {
        let log_events = events
            .iter()
            .map(|event| {
                InputLogEvent::builder()
                    .timestamp(event.timestamp_millis)
                    .message(event.message.clone())
                    .build()
                    .map_err(|err| SinkError::Request(err.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let time = Instant::now();
        let result = self
            .client
            .put_log_events()
            .log_group_name(destination.group.as_str())
            .log_stream_name(destination.stream.as_str())
            .set_log_events(Some(log_events))
            .set_sequence_token(token.map(|token| token.as_str().to_string()))
            .send()
            .await;
        debug!(
            "PutLogEvents of {} events took {} ms",
            events.len(),
            time.elapsed().as_millis()
        );

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                match err.as_service_error() {
                    Some(PutLogEventsError::InvalidSequenceTokenException(e)) => {
                        return Err(PutEventsError::StaleToken {
                            expected: e.expected_sequence_token().map(SequenceToken::from),
                        });
                    }
                    Some(PutLogEventsError::DataAlreadyAcceptedException(e)) => {
                        return Err(PutEventsError::AlreadyAccepted {
                            next: e.expected_sequence_token().map(SequenceToken::from),
                        });
                    }
                    _ => {}
                }
                return Err(PutEventsError::Sink(sink_error(err)));
            }
        };

        if let Some(rejected) = output.rejected_log_events_info() {
            warn!("DELIVERY | {destination} rejected some events: {rejected:?}");
        }
        Ok(output.next_sequence_token().map(SequenceToken::from))
    }
}
