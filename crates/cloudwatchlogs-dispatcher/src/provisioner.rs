// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use tracing::debug;

use crate::destination::Destination;
use crate::sink::{CreateError, LogSink, SinkError};

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to create log group {group}: {source}")]
    Group { group: String, source: SinkError },
    #[error("failed to create log stream {destination}: {source}")]
    Stream {
        destination: Destination,
        source: SinkError,
    },
}

/// Makes sure the group and stream of a destination exist before events are
/// written to it. Lives for one cycle and remembers the groups it already created.
pub struct Provisioner<'a> {
    sink: &'a (dyn LogSink + Send + Sync),
    groups: HashSet<String>,
}

impl<'a> Provisioner<'a> {
    pub fn new(sink: &'a (dyn LogSink + Send + Sync)) -> Self {
        Provisioner {
            sink,
            groups: HashSet::new(),
        }
    }

    pub async fn ensure(&mut self, destination: &Destination) -> Result<(), ProvisionError> {
        if !self.groups.contains(&destination.group) {
            match self.sink.create_group(&destination.group).await {
                Ok(()) => debug!("PROVISION | Created log group {}", destination.group),
                Err(CreateError::AlreadyExists) => {}
                Err(CreateError::Sink(source)) => {
                    return Err(ProvisionError::Group {
                        group: destination.group.clone(),
                        source,
                    })
                }
            }
            self.groups.insert(destination.group.clone());
        }

        match self
            .sink
            .create_stream(&destination.group, &destination.stream)
            .await
        {
            Ok(()) => {
                debug!("PROVISION | Created log stream {destination}");
                Ok(())
            }
            Err(CreateError::AlreadyExists) => Ok(()),
            Err(CreateError::Sink(source)) => Err(ProvisionError::Stream {
                destination: destination.clone(),
                source,
            }),
        }
    }
}
