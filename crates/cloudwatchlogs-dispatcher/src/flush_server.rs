// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use hyper::service::service_fn;
use hyper::{http, Method, Response, StatusCode};
use serde_json::json;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

use crate::config;
use crate::dispatcher::Dispatcher;
use crate::dispatcher_service::{DispatcherHandle, DispatcherService};
use crate::flush_processor;
use crate::http_utils::{self, log_and_create_http_response, HttpRequest, HttpResponse};
use crate::sink::LogSink;

const FLUSH_ENDPOINT_PATH: &str = "/";
const INFO_ENDPOINT_PATH: &str = "/info";

/// Receives flushes from Fluent Bit and hands them to a single dispatcher worker.
pub struct FlushServer {
    pub config: Arc<config::Config>,
    pub flush_processor: Arc<dyn flush_processor::FlushProcessor + Send + Sync>,
    pub sink: Arc<dyn LogSink + Send + Sync>,
}

impl FlushServer {
    pub async fn start_flush_server(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(&self.config.addr).await?;
        self.serve(listener).await
    }

    /// Serves flush requests on an already bound listener until the listener or the
    /// dispatcher worker fails.
    pub async fn serve(
        &self,
        listener: tokio::net::TcpListener,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();

        // the dispatcher worker is the only place a flush cycle runs. every request handler
        // gets a handle and waits in its queue.
        let (dispatcher_service, dispatcher) = DispatcherService::new(Dispatcher::new(
            Arc::clone(&self.sink),
            &self.config,
        ));
        let dispatcher_handle = tokio::spawn(dispatcher_service.run());

        let flush_processor = self.flush_processor.clone();
        let endpoint_config = self.config.clone();

        let service = service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
            // called for each http request
            let flush_processor = flush_processor.clone();
            let dispatcher = dispatcher.clone();
            let endpoint_config = endpoint_config.clone();

            FlushServer::flush_endpoint_handler(
                endpoint_config,
                req.map(http_utils::incoming_body),
                flush_processor,
                dispatcher,
            )
        });

        info!("Flush server listening on {}", listener.local_addr()?);
        debug!(
            "Time taken to start the flush server: {} ms",
            now.elapsed().as_millis()
        );

        Self::serve_tcp(listener, service, dispatcher_handle).await
    }

    async fn serve_tcp<S>(
        listener: tokio::net::TcpListener,
        service: S,
        mut dispatcher_handle: tokio::task::JoinHandle<()>,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        S: hyper::service::Service<
                hyper::Request<hyper::body::Incoming>,
                Response = HttpResponse,
            > + Clone
            + Send
            + 'static,
        S::Future: Send,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        let http1 = hyper::server::conn::http1::Builder::new();
        let mut connections = tokio::task::JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) if is_transient_accept_error(&e) => continue,
                        Err(e) => {
                            error!("Failed to accept flush connection: {e}");
                            return Err(e.into());
                        }
                    };
                    let http1 = http1.clone();
                    let service = service.clone();
                    connections.spawn(async move {
                        let io = hyper_util::rt::TokioIo::new(stream);
                        if let Err(e) = http1.serve_connection(io, service).await {
                            debug!("Flush connection closed with error: {e}");
                        }
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!("Flush connection task panicked: {e:?}");
                        }
                    }
                }
                result = &mut dispatcher_handle => {
                    error!("Dispatcher task exited: {result:?}");
                    return Err("dispatcher task exited while serving".into());
                }
            }
        }
    }

    async fn flush_endpoint_handler(
        config: Arc<config::Config>,
        req: HttpRequest,
        flush_processor: Arc<dyn flush_processor::FlushProcessor + Send + Sync>,
        dispatcher: DispatcherHandle,
    ) -> http::Result<HttpResponse> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, INFO_ENDPOINT_PATH) => match Self::info_handler(&config) {
                Ok(res) => Ok(res),
                Err(err) => log_and_create_http_response(
                    &format!("Info endpoint error: {err}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            },
            // Fluent Bit posts to whichever URI it is configured with
            (&Method::PUT | &Method::POST, _) => {
                match flush_processor
                    .process_flush(config, req, dispatcher)
                    .await
                {
                    Ok(res) => Ok(res),
                    Err(err) => log_and_create_http_response(
                        &format!("Error processing flush: {err}"),
                        StatusCode::INTERNAL_SERVER_ERROR,
                    ),
                }
            }
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    fn info_handler(config: &config::Config) -> http::Result<HttpResponse> {
        let config_json = json!({
            "addr": config.addr.to_string(),
            "prefix": config.prefix,
            "cluster": config.cluster,
            "batch": config.batch_size.get(),
            "debug": config.debug,
            "on_failure": config.failure_policy.to_string(),
            "cloudwatch_endpoint": config.cloudwatch_endpoint,
        });

        let response_json = json!(
            {
                "endpoints": [
                    FLUSH_ENDPOINT_PATH,
                    INFO_ENDPOINT_PATH
                ],
                "config": config_json
            }
        );
        Response::builder()
            .status(200)
            .header(hyper::header::CONTENT_TYPE, "application/json")
            .body(http_body_util::Full::new(bytes::Bytes::from(
                response_json.to_string(),
            )))
    }
}

fn is_transient_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}
