// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Control-plane protocol: the request/reply vocabulary between the bus
//! controller and a handler worker, plus the controller-side client.
//!
//! Requests are single-frame UTF-8 strings. The readiness reply carries two
//! frames (status string, then the worker's rank bytes); flush and exit
//! replies are single-frame strings.

use std::time::Duration;

use bytes::Bytes;
use logbus_ipc::{ReqSocket, TransportError};
use thiserror::Error;

pub const READY_REQ: &str = "ready?";
pub const READY_REP: &str = "ready!";
pub const FLUSH_REQ: &str = "flush?";
pub const FLUSH_REP: &str = "flushed!";
pub const EXIT_REQ: &str = "exit?";
pub const EXIT_REP: &str = "exited!";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected control reply {0:?}")]
    UnexpectedReply(String),
}

/// Outcome of the readiness handshake as observed by the controller: the
/// worker's rank, plus the worker's startup error rendered as a string when
/// it failed to come up healthy.
#[derive(Debug)]
pub struct ReadyAck {
    pub rank: u32,
    pub error: Option<String>,
}

/// Controller-side client for one handler worker's control endpoint.
pub struct ControlClient {
    sock: ReqSocket,
}

impl ControlClient {
    /// Connects to a worker's control endpoint, waiting for the worker to
    /// bind it if necessary.
    pub async fn connect(ctrl_url: &str) -> Result<Self, TransportError> {
        let sock = ReqSocket::connect_retry(ctrl_url, DEFAULT_CONNECT_TIMEOUT).await?;
        Ok(Self { sock })
    }

    /// Performs the readiness handshake. The worker always answers once,
    /// healthy or not; a startup failure arrives as `ReadyAck::error`.
    pub async fn ready(&self) -> Result<ReadyAck, ControlError> {
        let frames = self
            .sock
            .request(Bytes::from_static(READY_REQ.as_bytes()))
            .await?;
        let status = frames
            .first()
            .ok_or_else(|| ControlError::UnexpectedReply("<empty>".to_string()))?;
        let rank_frame = frames
            .get(1)
            .ok_or_else(|| ControlError::UnexpectedReply(lossy(status)))?;
        let rank = match <[u8; 4]>::try_from(rank_frame.as_ref()) {
            Ok(le) => u32::from_le_bytes(le),
            Err(_) => return Err(ControlError::UnexpectedReply(lossy(rank_frame))),
        };
        let error = if status.as_ref() == READY_REP.as_bytes() {
            None
        } else {
            Some(lossy(status))
        };
        Ok(ReadyAck { rank, error })
    }

    /// Requests an explicit flush; returns once the worker has drained its
    /// data endpoint and run the sink's flush hook.
    pub async fn flush(&self) -> Result<(), ControlError> {
        self.expect_single(FLUSH_REQ, FLUSH_REP).await
    }

    /// Requests worker shutdown; returns once the worker has flushed and
    /// committed to leaving its loop.
    pub async fn exit(&self) -> Result<(), ControlError> {
        self.expect_single(EXIT_REQ, EXIT_REP).await
    }

    async fn expect_single(&self, req: &'static str, rep: &'static str) -> Result<(), ControlError> {
        let frames = self.sock.request(Bytes::from_static(req.as_bytes())).await?;
        match frames.first() {
            Some(frame) if frame.as_ref() == rep.as_bytes() => Ok(()),
            Some(frame) => Err(ControlError::UnexpectedReply(lossy(frame))),
            None => Err(ControlError::UnexpectedReply("<empty>".to_string())),
        }
    }
}

fn lossy(frame: &Bytes) -> String {
    String::from_utf8_lossy(frame).into_owned()
}
