// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod cloudwatch;
pub mod config;
pub mod delivery;
pub mod destination;
pub mod dispatcher;
pub mod dispatcher_service;
pub mod flush_processor;
pub mod flush_server;
pub mod http_utils;
pub mod line;
pub mod provisioner;
pub mod sink;

#[cfg(test)]
mod test_support;
