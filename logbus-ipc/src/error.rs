// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors surfaced by the in-process transport endpoints.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Another endpoint is already bound at this address.
    #[error("address {0:?} is already bound")]
    AddrInUse(String),
    /// No endpoint is bound at this address.
    #[error("no endpoint bound at {0:?}")]
    NotBound(String),
    /// The endpoint bound at this address is of an incompatible kind.
    #[error("endpoint at {0:?} does not support this operation")]
    EndpointMismatch(String),
    /// The peer side of the channel is gone.
    #[error("peer endpoint closed")]
    Closed,
    /// No message is available right now. Non-blocking receives report this
    /// instead of waiting; callers treat it as "empty", not as a failure.
    #[error("no message available")]
    WouldBlock,
    /// The receive queue reached its high-water mark.
    #[error("receive queue full")]
    Full,
    /// A request/reply endpoint was driven out of its strict
    /// receive-then-reply alternation.
    #[error("request/reply out of step")]
    OutOfTurn,
}
