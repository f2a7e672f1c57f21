// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ready-made sinks: a buffered file handler and a console handler.

mod console;
mod file;

pub use console::{ConsoleHandler, StdTarget};
pub use file::FileHandler;

use crate::record::Record;

/// One text line per record: timestamp, severity, pid.tid, logger name,
/// source location, message.
pub(crate) fn format_record(record: &Record) -> String {
    let header = record.header();
    format!(
        "{}.{:09} {:<8} {}.{} {} {}:{} {}",
        header.ts_secs,
        header.ts_nanos,
        header.level,
        header.pid,
        header.tid,
        String::from_utf8_lossy(record.logger_name()),
        String::from_utf8_lossy(record.filename()),
        header.line,
        String::from_utf8_lossy(record.message()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Level, RecordHeader};

    #[test]
    fn formatted_line_carries_every_field() {
        let mut header = RecordHeader::new(Level::Error, 7);
        header.ts_secs = 1700000000;
        header.ts_nanos = 42;
        header.pid = 10;
        header.tid = 11;
        let buf = Record::pack(header, "db.rs", "query", "db.conn", "timeout");
        let line = format_record(&Record::parse(buf));

        assert_eq!(line, "1700000000.000000042 error    10.11 db.conn db.rs:7 timeout");
    }
}
