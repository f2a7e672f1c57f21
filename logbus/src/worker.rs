// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-handler worker: lifecycle orchestration and the event loop.
//!
//! One worker runs per handler instance, on its own OS thread driving a
//! single-threaded runtime. The worker binds a control endpoint
//! (request/reply) and a data endpoint (record fan-in), performs the
//! readiness handshake with the bus controller, then dispatches control
//! commands, records and private poll items until asked to exit. The sink
//! sees a flush at least once per configured cadence no matter how busy
//! the data endpoint is.

use std::time::{Duration, Instant};

use bytes::Bytes;
use logbus_ipc::{PullSocket, RepSocket, TransportError};

use crate::config::{HandlerParams, PrivateItem};
use crate::control::{EXIT_REP, EXIT_REQ, FLUSH_REP, FLUSH_REQ, READY_REP, READY_REQ};
use crate::error::{chain, BusError, ErrorKind};
use crate::handler::Handler;
use crate::os;
use crate::record::{Level, Record};

enum Wake {
    Ctrl(Result<Bytes, TransportError>),
    Data(Result<Bytes, TransportError>),
    Private(usize, Option<Bytes>),
    FlushDue,
}

/// Execution context of one handler instance.
pub struct HandlerWorker {
    handler: Box<dyn Handler>,
    params: HandlerParams,
    ctrl: Option<RepSocket>,
    data: Option<PullSocket>,
    ierr_count: usize,
}

/// Owner handle for a spawned worker thread.
pub struct WorkerHandle {
    ctrl_url: String,
    data_url: String,
    join: std::thread::JoinHandle<Result<(), BusError>>,
}

impl WorkerHandle {
    pub fn ctrl_url(&self) -> &str {
        &self.ctrl_url
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Waits for the worker to finish and returns its accumulated error.
    pub fn join(self) -> Result<(), BusError> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(BusError::new(ErrorKind::Panicked)),
        }
    }
}

impl HandlerWorker {
    pub fn new(handler: Box<dyn Handler>, params: HandlerParams) -> Self {
        Self {
            handler,
            params,
            ctrl: None,
            data: None,
            ierr_count: 0,
        }
    }

    /// Spawns the worker on a dedicated thread running a current-thread
    /// runtime. The returned handle joins back the lifecycle result.
    pub fn spawn(handler: Box<dyn Handler>, params: HandlerParams) -> std::io::Result<WorkerHandle> {
        let thread_name = format!("logbus-{}", handler.name());
        let ctrl_url = params.ctrl_url.clone();
        let data_url = params.data_url.clone();
        let join = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => return Err(BusError::new(ErrorKind::Runtime(err))),
                };
                let result = runtime.block_on(HandlerWorker::new(handler, params).run());
                runtime.shutdown_background();
                result
            })?;
        Ok(WorkerHandle {
            ctrl_url,
            data_url,
            join,
        })
    }

    /// Full lifecycle: init, endpoint setup, signal mask, readiness
    /// handshake, event loop, teardown, exit callback. Failures accumulate
    /// instead of short-circuiting; the readiness reply goes out even after
    /// an early failure so the controller is never left waiting, and the
    /// loop is only entered when startup was clean.
    pub async fn run(mut self) -> Result<(), BusError> {
        tracing::debug!(
            handler = self.handler.name(),
            tid = os::thread_id(),
            "handler worker starting"
        );

        let mut eerr: Result<(), BusError> = Ok(());

        let init = self
            .handler
            .init(&self.params)
            .map_err(|e| BusError::new(ErrorKind::Sink(e)));
        chain(&mut eerr, init);

        let bound = self.create_sockets();
        let routed = self.route_ierr(bound);
        chain(&mut eerr, routed);

        let masked = os::mask_signals().map_err(|e| BusError::new(ErrorKind::Signal(e)));
        let routed = self.route_ierr(masked);
        chain(&mut eerr, routed);

        let handshake = self.send_ready_status(&eerr).await;
        let routed = self.route_ierr(handshake);
        chain(&mut eerr, routed);

        if eerr.is_ok() {
            let looped = self.event_loop().await;
            let routed = self.route_ierr(looped);
            chain(&mut eerr, routed);
        }

        let cleanup = self.close_sockets();
        let routed = self.route_ierr(cleanup);
        chain(&mut eerr, routed);

        let exited = self
            .handler
            .process_exit()
            .map_err(|e| BusError::new(ErrorKind::Sink(e)));
        chain(&mut eerr, exited);

        match eerr {
            Ok(()) => {
                tracing::debug!(handler = self.handler.name(), "handler worker finished");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    handler = self.handler.name(),
                    error = %err.chain_string(),
                    "handler worker finished with errors"
                );
                Err(err)
            }
        }
    }

    fn create_sockets(&mut self) -> Result<(), BusError> {
        let mut res = Ok(());
        match RepSocket::bind(&self.params.ctrl_url, self.params.ctrl_hwm) {
            Ok(sock) => self.ctrl = Some(sock),
            Err(err) => chain(&mut res, Err(err.into())),
        }
        match PullSocket::bind(
            &self.params.data_url,
            self.params.data_hwm,
            self.params.rank_bytes(),
        ) {
            Ok(sock) => self.data = Some(sock),
            Err(err) => chain(&mut res, Err(err.into())),
        }
        res
    }

    /// Teardown order: data endpoint first, control endpoint last. Close
    /// errors are chained, never acted on.
    fn close_sockets(&mut self) -> Result<(), BusError> {
        let mut res = Ok(());
        if let Some(sock) = self.data.take() {
            chain(&mut res, sock.close().map_err(BusError::from));
        }
        if let Some(sock) = self.ctrl.take() {
            chain(&mut res, sock.close().map_err(BusError::from));
        }
        res
    }

    /// Readiness handshake. The controller blocks on this reply, so any
    /// transport failure here is unrecoverable and aborts the process.
    async fn send_ready_status(&mut self, eerr: &Result<(), BusError>) -> Result<(), BusError> {
        let rank = self.params.rank_bytes();
        let ctrl = match self.ctrl.as_mut() {
            Some(sock) => sock,
            None => handshake_fatal(&self.params.ctrl_url, "control endpoint missing"),
        };

        let msg = match ctrl.recv().await {
            Ok(msg) => msg,
            Err(err) => handshake_fatal(&self.params.ctrl_url, &err.to_string()),
        };
        if msg.as_ref() != READY_REQ.as_bytes() {
            return Err(BusError::new(ErrorKind::Protocol {
                expected: READY_REQ,
                received: String::from_utf8_lossy(&msg).into_owned(),
            }));
        }

        let status = match eerr {
            Ok(()) => Bytes::from_static(READY_REP.as_bytes()),
            Err(err) => Bytes::from(err.chain_string().into_bytes()),
        };
        if let Err(err) = ctrl.reply(vec![status, rank]) {
            handshake_fatal(&self.params.ctrl_url, &err.to_string());
        }
        Ok(())
    }

    async fn event_loop(&mut self) -> Result<(), BusError> {
        let mut ctrl = match self.ctrl.take() {
            Some(sock) => sock,
            None => {
                return Err(TransportError::NotBound(self.params.ctrl_url.clone()).into());
            }
        };
        let mut data = match self.data.take() {
            Some(sock) => sock,
            None => {
                self.ctrl = Some(ctrl);
                return Err(TransportError::NotBound(self.params.data_url.clone()).into());
            }
        };
        let mut private = std::mem::take(&mut self.params.private_items);

        let result = self.run_loop(&mut ctrl, &mut data, &mut private).await;

        self.params.private_items = private;
        self.ctrl = Some(ctrl);
        self.data = Some(data);
        result
    }

    async fn run_loop(
        &mut self,
        ctrl: &mut RepSocket,
        data: &mut PullSocket,
        private: &mut Vec<PrivateItem>,
    ) -> Result<(), BusError> {
        // A zero cadence would starve dispatch entirely; clamp to 1ms.
        let flush_freq = self.params.flush_freq.max(Duration::from_millis(1));
        let mut last_flush = Instant::now();

        loop {
            let deadline = last_flush + flush_freq;

            // Re-checked on every wakeup: sustained traffic keeps the
            // receive branches ready indefinitely, and a buffering sink must
            // still see a flush within the configured cadence.
            if Instant::now() >= deadline {
                let flushed = self.implicit_flush(data);
                last_flush = Instant::now();
                self.route_ierr(flushed)?;
                continue;
            }

            let wake = tokio::select! {
                biased;
                req = ctrl.recv() => Wake::Ctrl(req),
                msg = data.recv() => Wake::Data(msg),
                (idx, msg) = recv_private(private) => Wake::Private(idx, msg),
                _ = tokio::time::sleep_until(deadline.into()) => Wake::FlushDue,
            };

            match wake {
                Wake::FlushDue => {
                    let flushed = self.implicit_flush(data);
                    last_flush = Instant::now();
                    self.route_ierr(flushed)?;
                }
                Wake::Ctrl(Ok(cmd)) => {
                    let res = self.process_ctrl_cmd(ctrl, data, cmd);
                    if let Err(ref err) = res {
                        if err.is_loop_exit() {
                            return res;
                        }
                    }
                    self.route_ierr(res)?;
                }
                Wake::Ctrl(Err(err)) => {
                    self.route_ierr(Err(err.into()))?;
                }
                Wake::Data(Ok(msg)) => {
                    let res = self.deliver_record(msg);
                    self.route_ierr(res)?;
                }
                // Legal empty receive, nothing to do.
                Wake::Data(Err(TransportError::WouldBlock)) => {}
                Wake::Data(Err(err)) => {
                    self.route_ierr(Err(err.into()))?;
                }
                Wake::Private(idx, Some(msg)) => {
                    let res = match private.get_mut(idx) {
                        Some(item) => (item.callback)(msg)
                            .map_err(|e| BusError::new(ErrorKind::Sink(e))),
                        None => Ok(()),
                    };
                    self.route_ierr(res)?;
                }
                Wake::Private(idx, None) => {
                    // Sender side gone; stop polling the item.
                    if idx < private.len() {
                        private.remove(idx);
                    }
                    tracing::debug!(
                        handler = self.handler.name(),
                        item = idx,
                        "private poll item closed"
                    );
                }
            }
        }
    }

    /// One control command: recognised requests are answered per protocol;
    /// anything else has its reply discarded and is reported upward.
    fn process_ctrl_cmd(
        &mut self,
        ctrl: &mut RepSocket,
        data: &mut PullSocket,
        cmd: Bytes,
    ) -> Result<(), BusError> {
        if cmd.as_ref() == READY_REQ.as_bytes() {
            // Re-sync: a controller may probe readiness again at any time.
            let mut res = Ok(());
            chain(
                &mut res,
                ctrl.reply(vec![
                    Bytes::from_static(READY_REP.as_bytes()),
                    self.params.rank_bytes(),
                ])
                .map_err(BusError::from),
            );
            return res;
        }
        if cmd.as_ref() == FLUSH_REQ.as_bytes() {
            let mut res = self.explicit_flush(data);
            chain(
                &mut res,
                ctrl.reply(vec![Bytes::from_static(FLUSH_REP.as_bytes())])
                    .map_err(BusError::from),
            );
            return res;
        }
        if cmd.as_ref() == EXIT_REQ.as_bytes() {
            let mut res = self.implicit_flush(data);
            chain(
                &mut res,
                ctrl.reply(vec![Bytes::from_static(EXIT_REP.as_bytes())])
                    .map_err(BusError::from),
            );
            return Err(BusError::loop_exit(res));
        }
        ctrl.discard_pending();
        Err(BusError::new(ErrorKind::UnknownCommand(
            String::from_utf8_lossy(&cmd).into_owned(),
        )))
    }

    /// Parses one record, evaluates the filter list and hands admitted
    /// records to the sink. `Off` is a threshold, not a record severity.
    fn deliver_record(&mut self, buf: Bytes) -> Result<(), BusError> {
        let record = Record::parse(buf);
        let threshold = self.params.filters.effective_level(record.logger_name());
        if record.header().level != Level::Off && record.header().level <= threshold {
            self.handler
                .process_log(&record)
                .map_err(|e| BusError::new(ErrorKind::Sink(e)))?;
        }
        Ok(())
    }

    /// Drains the data endpoint until it reports empty; the terminal
    /// would-block is swallowed, any other error stops the drain.
    fn drain_data(&mut self, data: &mut PullSocket) -> Result<(), BusError> {
        loop {
            match data.try_recv() {
                Ok(msg) => self.deliver_record(msg)?,
                Err(TransportError::WouldBlock) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn implicit_flush(&mut self, data: &mut PullSocket) -> Result<(), BusError> {
        let mut res = self.drain_data(data);
        let hook = self
            .handler
            .process_implicit_flush()
            .map_err(|e| BusError::new(ErrorKind::Sink(e)));
        chain(&mut res, hook);
        res
    }

    fn explicit_flush(&mut self, data: &mut PullSocket) -> Result<(), BusError> {
        let mut res = self.drain_data(data);
        let hook = self
            .handler
            .process_explicit_flush()
            .map_err(|e| BusError::new(ErrorKind::Sink(e)));
        chain(&mut res, hook);
        res
    }

    /// Routes an internal error through the handler's error callback. The
    /// loop-exit sentinel is unwrapped here: only the real error it carries
    /// (if any) reaches the callback. Every routed error counts against the
    /// internal-error budget, swallowed or not.
    fn route_ierr(&mut self, res: Result<(), BusError>) -> Result<(), BusError> {
        let err = match res {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        let actual = match err.into_parts() {
            (ErrorKind::LoopExit(inner), _) => match inner {
                Some(real) => *real,
                None => return Ok(()),
            },
            (kind, cause) => BusError::from_parts(kind, cause),
        };

        self.ierr_count += 1;
        tracing::warn!(
            handler = self.handler.name(),
            error = %actual.chain_string(),
            "internal error"
        );

        let mut out = self.handler.process_ierr(actual);
        if self.ierr_count > self.params.ierr_max {
            chain(
                &mut out,
                Err(BusError::new(ErrorKind::TooManyInternalErrors(
                    self.ierr_count,
                ))),
            );
        }
        out
    }
}

async fn recv_private(items: &mut [PrivateItem]) -> (usize, Option<Bytes>) {
    if items.is_empty() {
        return futures::future::pending().await;
    }
    let recvs = items
        .iter_mut()
        .enumerate()
        .map(|(idx, item)| Box::pin(async move { (idx, item.rx.recv().await) }))
        .collect::<Vec<_>>();
    let ((idx, msg), _, _) = futures::future::select_all(recvs).await;
    (idx, msg)
}

fn handshake_fatal(ctrl_url: &str, detail: &str) -> ! {
    tracing::error!(
        ctrl_url,
        detail,
        "readiness handshake failed; the controller cannot be unblocked, aborting"
    );
    std::process::abort();
}
