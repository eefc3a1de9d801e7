// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cloudwatchlogs_dispatcher::{
    cloudwatch::CloudWatchLogsSink, config, flush_processor, flush_server,
};

#[tokio::main]
pub async fn main() {
    let log_level = config::log_level();
    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_config=warn,aws_smithy_runtime=warn,{log_level}"
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match config::Config::new() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on startup: {e}");
            return;
        }
    };

    let sink = match CloudWatchLogsSink::new(&config).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Error creating CloudWatch Logs client: {e}");
            return;
        }
    };

    info!(
        "Shipping logs to {} under /{}/{} in chunks of {}",
        config
            .cloudwatch_endpoint
            .as_deref()
            .unwrap_or("the regional CloudWatch Logs endpoint"),
        config.prefix,
        config.cluster,
        config.batch_size
    );

    let flush_server = flush_server::FlushServer {
        config: Arc::clone(&config),
        flush_processor: Arc::new(flush_processor::FluentBitFlushProcessor {}),
        sink,
    };

    if let Err(e) = flush_server.start_flush_server().await {
        error!("Error when running the flush server: {e:?}");
    }
}
