// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::dispatcher::{CycleError, CycleReport, Dispatcher};
use crate::line::SourceLine;

/// Flush requests waiting for the worker. Senders wait once it is full.
pub const DISPATCH_QUEUE_CAPACITY: usize = 32;

#[derive(Debug)]
pub enum DispatcherCommand {
    Dispatch {
        lines: Vec<SourceLine>,
        response_tx: oneshot::Sender<Result<CycleReport, CycleError>>,
    },
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Cheap to clone. Every clone feeds the same single worker.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Queues `lines` and waits until their cycle has finished.
    pub async fn dispatch(&self, lines: Vec<SourceLine>) -> Result<CycleReport, DispatchError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(DispatcherCommand::Dispatch { lines, response_tx })
            .await
            .map_err(|e| DispatchError::Unavailable(format!("failed to queue flush: {e}")))?;

        let result = response_rx.await.map_err(|e| {
            DispatchError::Unavailable(format!("failed to receive flush result: {e}"))
        })?;
        Ok(result?)
    }

    pub async fn shutdown(&self) -> Result<(), mpsc::error::SendError<DispatcherCommand>> {
        self.tx.send(DispatcherCommand::Shutdown).await
    }
}

/// Owns the [`Dispatcher`] and runs cycles strictly one after another, so two
/// flushes never race on the sequence token of the same stream.
pub struct DispatcherService {
    dispatcher: Dispatcher,
    rx: mpsc::Receiver<DispatcherCommand>,
}

impl DispatcherService {
    pub fn new(dispatcher: Dispatcher) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(DISPATCH_QUEUE_CAPACITY);
        let service = Self { dispatcher, rx };
        let handle = DispatcherHandle { tx };
        (service, handle)
    }

    pub async fn run(mut self) {
        debug!("Dispatcher service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                DispatcherCommand::Dispatch { lines, response_tx } => {
                    let result = self.dispatcher.run_cycle(lines).await;
                    if response_tx.send(result).is_err() {
                        error!("Failed to send flush result - requester went away");
                    }
                }
                DispatcherCommand::Shutdown => {
                    debug!("Dispatcher service shutting down");
                    break;
                }
            }
        }

        debug!("Dispatcher service stopped");
    }
}
