// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Chained worker errors.
//!
//! The worker lifecycle accumulates failures instead of stopping at the
//! first one: socket teardown still runs after a failed handshake, the exit
//! callback still runs after a failed teardown, and so on. [`chain`] is the
//! accumulator for that discipline; every error keeps the one it superseded
//! as its cause, so the caller receives the full history as one chain.

use logbus_ipc::TransportError;
use thiserror::Error;

/// Classification of a worker error.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The control channel carried something other than the expected
    /// protocol message. Fatal: the worker refuses to start.
    #[error("expected control message {expected:?}, received {received:?}")]
    Protocol {
        expected: &'static str,
        received: String,
    },
    /// A control command outside the protocol. Reported, not fatal.
    #[error("unknown control command {0:?}")]
    UnknownCommand(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A handler callback failed.
    #[error("handler callback failed: {0:#}")]
    Sink(anyhow::Error),
    #[error("signal masking failed: {0}")]
    Signal(#[source] std::io::Error),
    #[error("worker runtime setup failed: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("worker thread panicked")]
    Panicked,
    /// The internal-error budget was exhausted; the worker gave up.
    #[error("internal error limit exceeded after {0} errors")]
    TooManyInternalErrors(usize),
    /// Loop-exit sentinel raised by the EXIT control command. Not a failure:
    /// it carries any real error observed while honouring the request and is
    /// unwrapped before reaching handler callbacks or the caller.
    #[error("exit requested")]
    LoopExit(Option<Box<BusError>>),
}

/// An error plus the chain of errors it superseded.
#[derive(Debug)]
pub struct BusError {
    kind: ErrorKind,
    cause: Option<Box<BusError>>,
}

impl BusError {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, cause: None }
    }

    pub fn from_parts(kind: ErrorKind, cause: Option<Box<BusError>>) -> Self {
        Self { kind, cause }
    }

    /// Builds the loop-exit sentinel, stashing any real error inside it.
    pub fn loop_exit(inner: Result<(), BusError>) -> Self {
        Self::new(ErrorKind::LoopExit(inner.err().map(Box::new)))
    }

    pub fn is_loop_exit(&self) -> bool {
        matches!(self.kind, ErrorKind::LoopExit(_))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn cause(&self) -> Option<&BusError> {
        self.cause.as_deref()
    }

    pub fn into_parts(self) -> (ErrorKind, Option<Box<BusError>>) {
        (self.kind, self.cause)
    }

    /// Renders the whole cause chain on one line, outermost first.
    pub fn chain_string(&self) -> String {
        let mut out = self.kind.to_string();
        let mut node = self.cause.as_deref();
        while let Some(err) = node {
            out.push_str("; caused by: ");
            out.push_str(&err.kind.to_string());
            node = err.cause.as_deref();
        }
        out
    }

    fn push_cause(&mut self, cause: BusError) {
        match self.cause {
            Some(ref mut inner) => inner.push_cause(cause),
            None => self.cause = Some(Box::new(cause)),
        }
    }
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for BusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for BusError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<TransportError> for BusError {
    fn from(err: TransportError) -> Self {
        Self::new(ErrorKind::Transport(err))
    }
}

/// Folds `next` into the accumulator: a new error supersedes whatever is
/// accumulated so far, keeping it as the innermost cause; `Ok` is a no-op.
pub fn chain(acc: &mut Result<(), BusError>, next: Result<(), BusError>) {
    if let Err(mut err) = next {
        if let Err(prev) = std::mem::replace(acc, Ok(())) {
            err.push_cause(prev);
        }
        *acc = Err(err);
    }
}
