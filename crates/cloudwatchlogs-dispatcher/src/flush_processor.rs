// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;
use http_body_util::BodyExt;
use hyper::{http, StatusCode};
use tracing::debug;

use crate::config::Config;
use crate::dispatcher_service::DispatcherHandle;
use crate::http_utils::{self, log_and_create_http_response, HttpRequest, HttpResponse};
use crate::line;

#[async_trait]
pub trait FlushProcessor {
    /// Decodes the Fluent Bit records in a request body and waits for them to be delivered
    /// through the given dispatcher.
    async fn process_flush(
        &self,
        config: Arc<Config>,
        req: HttpRequest,
        dispatcher: DispatcherHandle,
    ) -> http::Result<HttpResponse>;
}

#[derive(Clone)]
pub struct FluentBitFlushProcessor {}

#[async_trait]
impl FlushProcessor for FluentBitFlushProcessor {
    async fn process_flush(
        &self,
        config: Arc<Config>,
        req: HttpRequest,
        dispatcher: DispatcherHandle,
    ) -> http::Result<HttpResponse> {
        debug!("Received flush request");
        let (parts, body) = req.into_parts();

        if let Some(response) = http_utils::verify_request_content_length(
            &parts.headers,
            config.max_request_content_length,
            "Error processing flush",
        ) {
            return response;
        }

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                return log_and_create_http_response(
                    &format!("Error reading flush request body: {err}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        // double check the size in case transfer encoding is used
        if body.len() > config.max_request_content_length {
            return log_and_create_http_response(
                "Error processing flush: Payload too large",
                StatusCode::PAYLOAD_TOO_LARGE,
            );
        }

        let lines = match line::parse(&body) {
            Ok(lines) => lines,
            Err(err) => {
                return log_and_create_http_response(
                    &format!("Failed to parse request: {err}"),
                    StatusCode::BAD_REQUEST,
                );
            }
        };

        match dispatcher.dispatch(lines).await {
            Ok(report) => log_and_create_http_response(
                &format!(
                    "Successfully delivered {} events to {} destinations",
                    report.delivered_events(),
                    report.delivered.len()
                ),
                StatusCode::OK,
            ),
            Err(err) => log_and_create_http_response(
                &format!("Failed to send logs: {err}"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        }
    }
}
