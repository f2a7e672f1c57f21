// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use bytes::Bytes;
use logbus_ipc::{PushSocket, TransportError};

use crate::record::{Level, Record, RecordHeader};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Producer-side handle on a worker's data endpoint.
///
/// Cheap to clone; safe to share across producer threads. Sends never block:
/// a full receive queue surfaces as [`TransportError::Full`].
#[derive(Clone)]
pub struct Publisher {
    sock: PushSocket,
}

impl Publisher {
    /// Connects to a worker's data endpoint, waiting for the worker to bind
    /// it if necessary.
    pub async fn connect(data_url: &str) -> Result<Self, TransportError> {
        let sock = PushSocket::connect_retry(data_url, DEFAULT_CONNECT_TIMEOUT).await?;
        Ok(Self { sock })
    }

    /// Connects without waiting; for producer threads outside any runtime.
    pub fn connect_now(data_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            sock: PushSocket::connect(data_url)?,
        })
    }

    /// Packs and sends one record, stamping timestamp, pid and tid.
    pub fn publish(
        &self,
        level: Level,
        logger_name: &str,
        message: &str,
        filename: &str,
        funcname: &str,
        line: u32,
    ) -> Result<(), TransportError> {
        let header = RecordHeader::new(level, line);
        self.sock
            .try_send(Record::pack(header, filename, funcname, logger_name, message))
    }

    /// Sends an already-packed record buffer.
    pub fn publish_packed(&self, buf: Bytes) -> Result<(), TransportError> {
        self.sock.try_send(buf)
    }
}
