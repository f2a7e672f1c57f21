// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod handler;
pub mod handlers;
pub mod os;
pub mod producer;
pub mod record;
pub mod worker;

pub use config::HandlerParams;
pub use error::{chain, BusError, ErrorKind};
pub use filter::{Filter, Filters};
pub use handler::Handler;
pub use record::{Level, Record, RecordHeader};
