// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Packed log record wire layout.
//!
//! A record travels as one contiguous message: a fixed little-endian header
//! followed by four byte strings in this order, with no separators:
//! `filename | funcname | logger_name | log_message`. Each string's length
//! lives in the header, so demarshalling is pure slicing over the received
//! buffer without copying.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Severity of a log record or filter threshold. Lower numeric values are
/// more severe; a record passes a filter iff `record.level <= filter_level`.
/// `Off` is only meaningful as a threshold: it admits nothing.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Off = 0,
    Critical = 1,
    Error = 2,
    Warn = 3,
    Info = 4,
    Debug = 5,
    Trace = 6,
}

impl Level {
    /// Out-of-range values collapse to `Off`, which admits nothing.
    pub fn from_u8(value: u8) -> Level {
        match value {
            0 => Level::Off,
            1 => Level::Critical,
            2 => Level::Error,
            3 => Level::Warn,
            4 => Level::Info,
            5 => Level::Debug,
            6 => Level::Trace,
            _ => Level::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Off => "off",
            Level::Critical => "critical",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown log level {0:?}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Level::Off),
            "critical" => Ok(Level::Critical),
            "error" => Ok(Level::Error),
            "warn" | "warning" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            "debug" => Ok(Level::Debug),
            "trace" => Ok(Level::Trace),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

/// Size in bytes of the packed header.
pub const HEADER_LEN: usize = 45;

/// Fixed front matter of a packed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub level: Level,
    /// Wall-clock seconds since the Unix epoch at emission time.
    pub ts_secs: u64,
    pub ts_nanos: u32,
    /// Producer process id.
    pub pid: u32,
    /// Producer OS thread id.
    pub tid: i64,
    /// Source line of the emitting statement.
    pub line: u32,
    pub filename_len: u32,
    pub funcname_len: u32,
    pub logname_len: u32,
    pub msg_len: u32,
}

impl RecordHeader {
    /// Captures the current timestamp, process id and thread id. String
    /// lengths are filled in by [`Record::pack`].
    pub fn new(level: Level, line: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            level,
            ts_secs: now.as_secs(),
            ts_nanos: now.subsec_nanos(),
            pid: std::process::id(),
            tid: crate::os::thread_id(),
            line,
            filename_len: 0,
            funcname_len: 0,
            logname_len: 0,
            msg_len: 0,
        }
    }
}

/// A demarshalled record: the parsed header plus the received buffer it
/// points into. String accessors borrow from the buffer; nothing is copied.
#[derive(Debug)]
pub struct Record {
    buf: Bytes,
    header: RecordHeader,
}

impl Record {
    /// Packs a header and the four strings into one contiguous message.
    pub fn pack(
        mut header: RecordHeader,
        filename: &str,
        funcname: &str,
        logger_name: &str,
        message: &str,
    ) -> Bytes {
        header.filename_len = filename.len() as u32;
        header.funcname_len = funcname.len() as u32;
        header.logname_len = logger_name.len() as u32;
        header.msg_len = message.len() as u32;

        let total =
            HEADER_LEN + filename.len() + funcname.len() + logger_name.len() + message.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(header.level as u8);
        buf.put_u64_le(header.ts_secs);
        buf.put_u32_le(header.ts_nanos);
        buf.put_u32_le(header.pid);
        buf.put_i64_le(header.tid);
        buf.put_u32_le(header.line);
        buf.put_u32_le(header.filename_len);
        buf.put_u32_le(header.funcname_len);
        buf.put_u32_le(header.logname_len);
        buf.put_u32_le(header.msg_len);
        buf.put_slice(filename.as_bytes());
        buf.put_slice(funcname.as_bytes());
        buf.put_slice(logger_name.as_bytes());
        buf.put_slice(message.as_bytes());
        buf.freeze()
    }

    /// Demarshals a received message. The producer is trusted: lengths are
    /// not validated against the buffer beyond debug assertions.
    pub fn parse(buf: Bytes) -> Record {
        debug_assert!(buf.len() >= HEADER_LEN, "record shorter than its header");
        let mut cursor = &buf[..];
        let header = RecordHeader {
            level: Level::from_u8(cursor.get_u8()),
            ts_secs: cursor.get_u64_le(),
            ts_nanos: cursor.get_u32_le(),
            pid: cursor.get_u32_le(),
            tid: cursor.get_i64_le(),
            line: cursor.get_u32_le(),
            filename_len: cursor.get_u32_le(),
            funcname_len: cursor.get_u32_le(),
            logname_len: cursor.get_u32_le(),
            msg_len: cursor.get_u32_le(),
        };
        debug_assert!(
            buf.len()
                >= HEADER_LEN
                    + (header.filename_len + header.funcname_len + header.logname_len
                        + header.msg_len) as usize,
            "record strings exceed the received buffer"
        );
        Record { buf, header }
    }

    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    pub fn filename(&self) -> &[u8] {
        let start = HEADER_LEN;
        &self.buf[start..start + self.header.filename_len as usize]
    }

    pub fn funcname(&self) -> &[u8] {
        let start = HEADER_LEN + self.header.filename_len as usize;
        &self.buf[start..start + self.header.funcname_len as usize]
    }

    pub fn logger_name(&self) -> &[u8] {
        let start = HEADER_LEN + (self.header.filename_len + self.header.funcname_len) as usize;
        &self.buf[start..start + self.header.logname_len as usize]
    }

    pub fn message(&self) -> &[u8] {
        let start = HEADER_LEN
            + (self.header.filename_len + self.header.funcname_len + self.header.logname_len)
                as usize;
        &self.buf[start..start + self.header.msg_len as usize]
    }
}
