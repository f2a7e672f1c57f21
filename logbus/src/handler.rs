// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::HandlerParams;
use crate::error::BusError;
use crate::record::Record;

/// A log sink driven by a dedicated worker.
///
/// Every callback except [`Handler::name`] has a default body whose
/// behaviour is exactly that of an absent callback: `init` succeeds, the
/// flush and exit hooks do nothing, `process_log` drops the record and
/// `process_ierr` lets errors pass through unchanged. Implementations
/// override only what they need.
///
/// Callbacks run on the worker thread and are trusted to return; there is no
/// timeout around them.
pub trait Handler: Send {
    /// Short sink name; also the first path segment of the worker's
    /// in-process addresses.
    fn name(&self) -> &str;

    /// Invoked once, before any I/O. A failure here keeps the worker out of
    /// its event loop: the readiness handshake reports the error to the
    /// controller and the worker proceeds straight to teardown.
    fn init(&mut self, params: &HandlerParams) -> anyhow::Result<()> {
        let _ = params;
        Ok(())
    }

    /// Invoked once per record admitted by the filter list, in arrival
    /// order.
    fn process_log(&mut self, record: &Record) -> anyhow::Result<()> {
        let _ = record;
        Ok(())
    }

    /// Invoked after the periodic (or shutdown-time) drain of the data
    /// endpoint. Buffering sinks push their buffers out here.
    fn process_implicit_flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked after a drain requested over the control channel.
    fn process_explicit_flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked once, after the worker's endpoints are gone.
    fn process_exit(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Offered every internal error before it is accounted against the
    /// worker. Return `Ok(())` to swallow the error, return it (default) or
    /// a transformed error to let it surface.
    fn process_ierr(&mut self, err: BusError) -> Result<(), BusError> {
        Err(err)
    }
}
