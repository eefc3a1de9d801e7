// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use cloudwatchlogs_dispatcher::config::{Config, FailurePolicy};
use cloudwatchlogs_dispatcher::flush_processor::FluentBitFlushProcessor;
use cloudwatchlogs_dispatcher::flush_server::FlushServer;
use cloudwatchlogs_dispatcher::sink::LogSink;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub fn create_test_config(batch_size: usize, failure_policy: FailurePolicy) -> Config {
    Config {
        prefix: "acme".to_string(),
        cluster: "prod1".to_string(),
        batch_size: NonZeroUsize::new(batch_size).unwrap(),
        debug: true,
        addr: "127.0.0.1:0".parse().unwrap(),
        cloudwatch_endpoint: None,
        failure_policy,
        max_request_content_length: 10 * 1024 * 1024,
        request_timeout_secs: 1,
    }
}

/// Starts a flush server on a random local port and returns the port.
pub async fn start_flush_server(config: Config, sink: Arc<dyn LogSink + Send + Sync>) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind flush server");
    let port = listener.local_addr().unwrap().port();

    let server = FlushServer {
        config: Arc::new(config),
        flush_processor: Arc::new(FluentBitFlushProcessor {}),
        sink,
    };
    tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            panic!("flush server stopped: {e}");
        }
    });
    port
}

/// One Fluent Bit record for a pod annotated with project `project` and environment `e`.
pub fn record(message: &str, project: &str, container: &str, time: f64) -> serde_json::Value {
    json!({
        "timestamp": time,
        "log": message,
        "kubernetes": {
            "namespace_name": "ns",
            "pod_name": format!("{project}-pod"),
            "container_name": container,
            "annotations": {
                "fluentbit.skpr.io/project": project,
                "fluentbit.skpr.io/environment": "e"
            }
        }
    })
}

/// Send an HTTP request over TCP and return the status and body
pub async fn send_tcp_request(
    port: u16,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<(StatusCode, String), Box<dyn std::error::Error>> {
    let stream = timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)),
    )
    .await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", format!("127.0.0.1:{port}"))
        .header("Content-Type", "application/json");

    if let Some(body_data) = &body {
        request_builder = request_builder.header("Content-Length", body_data.len().to_string());
    }
    let request = request_builder.body(Full::new(Bytes::from(body.unwrap_or_default())))?;
    let response = timeout(Duration::from_secs(5), sender.send_request(request)).await??;

    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, String::from_utf8(bytes.to_vec())?))
}
