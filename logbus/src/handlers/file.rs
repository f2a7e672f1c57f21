// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::HandlerParams;
use crate::handler::Handler;
use crate::record::Record;

use super::format_record;

/// Buffered file sink. Records accumulate in a [`BufWriter`]; the worker's
/// flush cadence bounds how long a line can sit in the buffer before it
/// reaches the file.
pub struct FileHandler {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileHandler {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> anyhow::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .context("file sink used before init or after exit")
    }
}

impl Handler for FileHandler {
    fn name(&self) -> &str {
        "file"
    }

    fn init(&mut self, _params: &HandlerParams) -> anyhow::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening log file {}", self.path.display()))?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> anyhow::Result<()> {
        let line = format_record(record);
        let writer = self.writer()?;
        writeln!(writer, "{line}")?;
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> anyhow::Result<()> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn process_explicit_flush(&mut self) -> anyhow::Result<()> {
        self.process_implicit_flush()
    }

    fn process_exit(&mut self) -> anyhow::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filters;
    use crate::record::{Level, RecordHeader};

    fn record(logger: &str, msg: &str) -> Record {
        Record::parse(Record::pack(
            RecordHeader::new(Level::Info, 1),
            "app.rs",
            "main",
            logger,
            msg,
        ))
    }

    #[test]
    fn lines_reach_the_file_after_a_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileHandler::new(&path);
        let params = HandlerParams::new("file", 0, Filters::default());

        sink.init(&params).unwrap();
        sink.process_log(&record("app", "first")).unwrap();
        sink.process_log(&record("app", "second")).unwrap();
        sink.process_implicit_flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("first"));
        assert!(contents.contains("second"));
    }

    #[test]
    fn exit_flushes_whatever_is_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut sink = FileHandler::new(&path);
        let params = HandlerParams::new("file", 0, Filters::default());

        sink.init(&params).unwrap();
        sink.process_log(&record("app", "tail line")).unwrap();
        sink.process_exit().unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("tail line"));
    }

    #[test]
    fn logging_without_init_is_an_error() {
        let mut sink = FileHandler::new("/nonexistent/app.log");
        assert!(sink.process_log(&record("app", "x")).is_err());
    }
}
