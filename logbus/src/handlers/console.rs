// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use crate::handler::Handler;
use crate::record::{Level, Record};

use super::format_record;

/// Terminal stream a record is routed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StdTarget {
    Out,
    Err,
}

/// Unbuffered console sink: severities at or above the configured threshold
/// go to stderr, the rest to stdout.
pub struct ConsoleHandler {
    stderr_level: Level,
}

impl ConsoleHandler {
    pub fn new(stderr_level: Level) -> Self {
        Self { stderr_level }
    }

    fn target(&self, level: Level) -> StdTarget {
        if level != Level::Off && level <= self.stderr_level {
            StdTarget::Err
        } else {
            StdTarget::Out
        }
    }
}

impl Default for ConsoleHandler {
    fn default() -> Self {
        Self::new(Level::Warn)
    }
}

impl Handler for ConsoleHandler {
    fn name(&self) -> &str {
        "console"
    }

    fn process_log(&mut self, record: &Record) -> anyhow::Result<()> {
        let line = format_record(record);
        match self.target(record.header().level) {
            StdTarget::Err => writeln!(std::io::stderr().lock(), "{line}")?,
            StdTarget::Out => writeln!(std::io::stdout().lock(), "{line}")?,
        }
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> anyhow::Result<()> {
        std::io::stdout().lock().flush()?;
        std::io::stderr().lock().flush()?;
        Ok(())
    }

    fn process_explicit_flush(&mut self) -> anyhow::Result<()> {
        self.process_implicit_flush()
    }
}
