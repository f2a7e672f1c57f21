// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! URL-addressed in-process messaging endpoints.
//!
//! Two endpoint kinds are provided, both bound to `inproc://…` style string
//! addresses in a process-global registry:
//!
//! - [`RepSocket`] / [`ReqSocket`]: request/reply with strict
//!   receive-then-reply alternation on the bound side. Replies may carry
//!   multiple frames.
//! - [`PullSocket`] / [`PushSocket`]: one-way fan-in of single-frame
//!   messages, bounded by a receive high-water mark.
//!
//! Channel capacity is the high-water mark: a sender hitting it observes
//! [`TransportError::Full`] rather than blocking.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::TransportError;

/// One request frame plus the channel its reply must travel back on.
type ReqEnvelope = (Bytes, oneshot::Sender<Vec<Bytes>>);

enum Binding {
    Rep(mpsc::Sender<ReqEnvelope>),
    Pull(mpsc::Sender<Bytes>),
}

fn registry() -> MutexGuard<'static, HashMap<String, Binding>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Binding>>> = OnceLock::new();
    #[allow(clippy::unwrap_used)]
    REGISTRY
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap()
}

fn unbind(url: &str) -> Result<(), TransportError> {
    match registry().remove(url) {
        Some(_) => Ok(()),
        None => Err(TransportError::NotBound(url.to_string())),
    }
}

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(2);

/// Bound side of a request/reply channel.
///
/// The socket enforces strict alternation: every received request must be
/// answered with [`RepSocket::reply`] (or dropped with
/// [`RepSocket::discard_pending`]) before the next receive.
#[derive(Debug)]
pub struct RepSocket {
    url: String,
    rx: mpsc::Receiver<ReqEnvelope>,
    pending: Option<oneshot::Sender<Vec<Bytes>>>,
}

impl RepSocket {
    pub fn bind(url: &str, hwm: usize) -> Result<Self, TransportError> {
        let mut reg = registry();
        if reg.contains_key(url) {
            return Err(TransportError::AddrInUse(url.to_string()));
        }
        let (tx, rx) = mpsc::channel(hwm.max(1));
        reg.insert(url.to_string(), Binding::Rep(tx));
        tracing::debug!(url, "bound request/reply endpoint");
        Ok(Self {
            url: url.to_string(),
            rx,
            pending: None,
        })
    }

    /// Waits for the next request.
    pub async fn recv(&mut self) -> Result<Bytes, TransportError> {
        if self.pending.is_some() {
            return Err(TransportError::OutOfTurn);
        }
        match self.rx.recv().await {
            Some((frame, reply)) => {
                self.pending = Some(reply);
                Ok(frame)
            }
            None => Err(TransportError::Closed),
        }
    }

    /// Non-blocking receive; `WouldBlock` when no request is queued.
    pub fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        if self.pending.is_some() {
            return Err(TransportError::OutOfTurn);
        }
        match self.rx.try_recv() {
            Ok((frame, reply)) => {
                self.pending = Some(reply);
                Ok(frame)
            }
            Err(TryRecvError::Empty) => Err(TransportError::WouldBlock),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Answers the request received last; frames travel back as one reply.
    pub fn reply(&mut self, frames: Vec<Bytes>) -> Result<(), TransportError> {
        match self.pending.take() {
            Some(tx) => tx.send(frames).map_err(|_| TransportError::Closed),
            None => Err(TransportError::OutOfTurn),
        }
    }

    /// Drops the in-flight reply channel; the requester observes a closed
    /// reply instead of an answer.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Unbinds the endpoint. Each bound socket must be closed exactly once.
    pub fn close(self) -> Result<(), TransportError> {
        unbind(&self.url)
    }
}

/// Connecting side of a request/reply channel.
pub struct ReqSocket {
    tx: mpsc::Sender<ReqEnvelope>,
}

impl ReqSocket {
    pub fn connect(url: &str) -> Result<Self, TransportError> {
        match registry().get(url) {
            Some(Binding::Rep(tx)) => Ok(Self { tx: tx.clone() }),
            Some(Binding::Pull(_)) => Err(TransportError::EndpointMismatch(url.to_string())),
            None => Err(TransportError::NotBound(url.to_string())),
        }
    }

    /// Connects, retrying while the endpoint is not yet bound.
    pub async fn connect_retry(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::connect(url) {
                Err(TransportError::NotBound(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Sends one request frame and waits for the multi-frame reply.
    pub async fn request(&self, frame: Bytes) -> Result<Vec<Bytes>, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.try_send((frame, reply_tx)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Full,
            TrySendError::Closed(_) => TransportError::Closed,
        })?;
        reply_rx.await.map_err(|_| TransportError::Closed)
    }
}

/// Bound, receive-only side of a one-way channel.
pub struct PullSocket {
    url: String,
    identity: Bytes,
    rx: mpsc::Receiver<Bytes>,
}

impl PullSocket {
    pub fn bind(url: &str, hwm: usize, identity: Bytes) -> Result<Self, TransportError> {
        let mut reg = registry();
        if reg.contains_key(url) {
            return Err(TransportError::AddrInUse(url.to_string()));
        }
        let (tx, rx) = mpsc::channel(hwm.max(1));
        reg.insert(url.to_string(), Binding::Pull(tx));
        tracing::debug!(url, "bound pull endpoint");
        Ok(Self {
            url: url.to_string(),
            identity,
            rx,
        })
    }

    pub async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    /// Non-blocking receive; `WouldBlock` when the queue is empty.
    pub fn try_recv(&mut self) -> Result<Bytes, TransportError> {
        match self.rx.try_recv() {
            Ok(msg) => Ok(msg),
            Err(TryRecvError::Empty) => Err(TransportError::WouldBlock),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    /// Opaque identity the endpoint was bound with.
    pub fn identity(&self) -> &Bytes {
        &self.identity
    }

    /// Unbinds the endpoint. Each bound socket must be closed exactly once.
    pub fn close(self) -> Result<(), TransportError> {
        unbind(&self.url)
    }
}

/// Connecting, send-only side of a one-way channel.
#[derive(Clone)]
pub struct PushSocket {
    tx: mpsc::Sender<Bytes>,
}

impl PushSocket {
    pub fn connect(url: &str) -> Result<Self, TransportError> {
        match registry().get(url) {
            Some(Binding::Pull(tx)) => Ok(Self { tx: tx.clone() }),
            Some(Binding::Rep(_)) => Err(TransportError::EndpointMismatch(url.to_string())),
            None => Err(TransportError::NotBound(url.to_string())),
        }
    }

    /// Connects, retrying while the endpoint is not yet bound.
    pub async fn connect_retry(url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match Self::connect(url) {
                Err(TransportError::NotBound(_)) if Instant::now() < deadline => {
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    /// Non-blocking send; `Full` once the receive high-water mark is hit.
    pub fn try_send(&self, msg: Bytes) -> Result<(), TransportError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Full,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Blocking send for plain (non-runtime) producer threads. Must not be
    /// called from inside an async runtime.
    pub fn send_blocking(&self, msg: Bytes) -> Result<(), TransportError> {
        self.tx.blocking_send(msg).map_err(|_| TransportError::Closed)
    }
}
