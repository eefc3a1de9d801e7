// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use crate::line::Kubernetes;

/// Used to construct a CloudWatch Logs group.
pub const ANNOTATION_PROJECT: &str = "fluentbit.skpr.io/project";
/// Used to construct a CloudWatch Logs group.
pub const ANNOTATION_ENVIRONMENT: &str = "fluentbit.skpr.io/environment";
/// Overrides the default project/environment naming convention.
pub const ANNOTATION_GROUP_OVERRIDE: &str = "fluentbit.skpr.io/group-override";

/// A log group and stream pair which an ordered sequence of events is appended to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Destination {
    pub group: String,
    pub stream: String,
}

impl Destination {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Destination {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.stream)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingAnnotation(&'static str),
    MissingContainer,
    EmptyGroupOverride,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingAnnotation(key) => write!(f, "not found: {key}"),
            SkipReason::MissingContainer => write!(f, "container name is empty"),
            SkipReason::EmptyGroupOverride => {
                write!(f, "{ANNOTATION_GROUP_OVERRIDE} is empty")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Accept(Destination),
    Skip(SkipReason),
}

/// Derives the destination of a line from its Kubernetes metadata.
#[derive(Debug, Clone)]
pub struct DestinationResolver {
    prefix: String,
    cluster: String,
}

impl DestinationResolver {
    pub fn new(prefix: impl Into<String>, cluster: impl Into<String>) -> Self {
        DestinationResolver {
            prefix: prefix.into(),
            cluster: cluster.into(),
        }
    }

    pub fn resolve(&self, kubernetes: &Kubernetes) -> Resolution {
        let group = match self.group_name(kubernetes) {
            Ok(group) => group,
            Err(reason) => return Resolution::Skip(reason),
        };

        if kubernetes.container.is_empty() {
            return Resolution::Skip(SkipReason::MissingContainer);
        }

        Resolution::Accept(Destination {
            group,
            stream: kubernetes.container.clone(),
        })
    }

    fn group_name(&self, kubernetes: &Kubernetes) -> Result<String, SkipReason> {
        let annotations = &kubernetes.annotations;

        if let Some(group) = annotations.get(ANNOTATION_GROUP_OVERRIDE) {
            if group.is_empty() {
                return Err(SkipReason::EmptyGroupOverride);
            }
            return Ok(group.clone());
        }

        let project = annotations
            .get(ANNOTATION_PROJECT)
            .ok_or(SkipReason::MissingAnnotation(ANNOTATION_PROJECT))?;
        let environment = annotations
            .get(ANNOTATION_ENVIRONMENT)
            .ok_or(SkipReason::MissingAnnotation(ANNOTATION_ENVIRONMENT))?;

        Ok(format!(
            "/{}/{}/{}/{}",
            self.prefix, self.cluster, project, environment
        ))
    }
}
