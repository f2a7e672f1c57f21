// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end lifecycle tests: a spawned worker driven through the control
//! client and record publisher, observed through a recording sink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use bytes::Bytes;
use logbus::config::PrivateItem;
use logbus::control::ControlClient;
use logbus::handlers::FileHandler;
use logbus::producer::Publisher;
use logbus::worker::{HandlerWorker, WorkerHandle};
use logbus::{ErrorKind, Filter, Filters, Handler, HandlerParams, Level, Record};
use logbus_ipc::{ReqSocket, TransportError};

#[derive(Default)]
struct Observed {
    logs: Vec<(String, Level, String)>,
    implicit_flushes: usize,
    explicit_flushes: usize,
    exits: usize,
}

#[derive(Clone)]
struct RecordingHandler {
    state: Arc<Mutex<Observed>>,
    fail_init: Option<String>,
}

impl RecordingHandler {
    fn new() -> (Self, Arc<Mutex<Observed>>) {
        let state = Arc::new(Mutex::new(Observed::default()));
        (
            Self {
                state: state.clone(),
                fail_init: None,
            },
            state,
        )
    }

    fn failing_init(message: &str) -> (Self, Arc<Mutex<Observed>>) {
        let (mut handler, state) = Self::new();
        handler.fail_init = Some(message.to_string());
        (handler, state)
    }
}

impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        "recording"
    }

    fn init(&mut self, _params: &HandlerParams) -> anyhow::Result<()> {
        if let Some(message) = &self.fail_init {
            bail!("{message}");
        }
        Ok(())
    }

    fn process_log(&mut self, record: &Record) -> anyhow::Result<()> {
        self.state.lock().unwrap().logs.push((
            String::from_utf8_lossy(record.logger_name()).into_owned(),
            record.header().level,
            String::from_utf8_lossy(record.message()).into_owned(),
        ));
        Ok(())
    }

    fn process_implicit_flush(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().implicit_flushes += 1;
        Ok(())
    }

    fn process_explicit_flush(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().explicit_flushes += 1;
        Ok(())
    }

    fn process_exit(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().exits += 1;
        Ok(())
    }
}

fn spawn_recording(handler: RecordingHandler, params: HandlerParams) -> WorkerHandle {
    HandlerWorker::spawn(Box::new(handler), params).unwrap()
}

#[tokio::test]
async fn healthy_lifecycle_delivers_flushes_and_exits() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (handler, state) = RecordingHandler::new();
    let params = HandlerParams::new("recording", 0x2A, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    let ack = ctl.ready().await.unwrap();
    assert_eq!(ack.rank, 0x2A);
    assert!(ack.error.is_none(), "unexpected startup error: {ack:?}");

    let publisher = Publisher::connect(worker.data_url()).await.unwrap();
    for i in 0..3 {
        publisher
            .publish(
                Level::Info,
                "app.core",
                &format!("message {i}"),
                "app.rs",
                "run",
                10 + i,
            )
            .unwrap();
    }

    ctl.flush().await.unwrap();
    {
        let seen = state.lock().unwrap();
        assert_eq!(seen.logs.len(), 3);
        assert_eq!(seen.logs[0].2, "message 0");
        assert_eq!(seen.logs[1].2, "message 1");
        assert_eq!(seen.logs[2].2, "message 2");
        assert_eq!(seen.explicit_flushes, 1);
    }

    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert!(seen.implicit_flushes >= 1, "exit must trigger an implicit flush");
    assert_eq!(seen.exits, 1);
}

#[tokio::test]
async fn records_outside_the_filter_list_are_dropped() {
    let (handler, state) = RecordingHandler::new();
    let mut params = HandlerParams::new("recording", 1, Filters::default());
    params.filters = Filters::new(vec![
        Filter::new("a.", Level::Info),
        Filter::new("a.b.", Level::Off),
    ]);
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    let publisher = Publisher::connect(worker.data_url()).await.unwrap();
    publisher
        .publish(Level::Info, "a.x", "admitted", "a.rs", "f", 1)
        .unwrap();
    publisher
        .publish(Level::Info, "a.b.y", "muted by override", "a.rs", "f", 2)
        .unwrap();
    publisher
        .publish(Level::Error, "z", "no matching prefix", "z.rs", "f", 3)
        .unwrap();

    ctl.flush().await.unwrap();
    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert_eq!(seen.logs.len(), 1);
    assert_eq!(seen.logs[0].0, "a.x");
    assert_eq!(seen.logs[0].2, "admitted");
}

#[tokio::test]
async fn implicit_flushes_keep_their_cadence_without_traffic() {
    let (handler, state) = RecordingHandler::new();
    let mut params = HandlerParams::new("recording", 2, Filters::catch_all(Level::Trace));
    params.flush_freq = Duration::from_millis(50);
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    tokio::time::sleep(Duration::from_millis(230)).await;

    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert!(
        seen.implicit_flushes >= 3,
        "expected at least 3 periodic flushes, saw {}",
        seen.implicit_flushes
    );
}

#[tokio::test]
async fn zero_flush_cadence_still_makes_progress() {
    let (handler, state) = RecordingHandler::new();
    let mut params = HandlerParams::new("recording", 3, Filters::catch_all(Level::Trace));
    params.flush_freq = Duration::ZERO;
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    let publisher = Publisher::connect(worker.data_url()).await.unwrap();
    publisher
        .publish(Level::Info, "app", "under pressure", "app.rs", "f", 1)
        .unwrap();

    ctl.flush().await.unwrap();
    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert_eq!(seen.logs.len(), 1);
    assert!(seen.implicit_flushes >= 1);
}

#[tokio::test]
async fn startup_failure_reports_through_the_handshake_and_skips_the_loop() {
    let (handler, state) = RecordingHandler::failing_init("disk quota exhausted");
    let params = HandlerParams::new("recording", 0x2A, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    let ack = ctl.ready().await.unwrap();
    assert_eq!(ack.rank, 0x2A);
    let error = ack.error.expect("startup failure must reach the controller");
    assert!(error.contains("disk quota exhausted"), "got: {error}");

    let err = worker.join().unwrap_err();
    assert!(
        err.chain_string().contains("disk quota exhausted"),
        "got: {}",
        err.chain_string()
    );

    let seen = state.lock().unwrap();
    assert!(seen.logs.is_empty());
    assert_eq!(seen.explicit_flushes, 0);
    assert_eq!(seen.exits, 1, "the exit callback still runs after failure");
}

#[tokio::test]
async fn non_ready_first_message_is_a_protocol_violation() {
    let (handler, state) = RecordingHandler::new();
    let params = HandlerParams::new("recording", 4, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let req = ReqSocket::connect_retry(worker.ctrl_url(), Duration::from_secs(2))
        .await
        .unwrap();
    let reply = req.request(Bytes::from_static(b"HELLO")).await;
    assert!(matches!(reply, Err(TransportError::Closed)));

    let err = worker.join().unwrap_err();
    let rendered = err.chain_string();
    assert!(rendered.contains("ready?"), "got: {rendered}");
    assert!(rendered.contains("HELLO"), "got: {rendered}");

    assert!(state.lock().unwrap().logs.is_empty());
}

#[tokio::test]
async fn consecutive_flushes_are_idempotent_and_lose_nothing() {
    let (handler, state) = RecordingHandler::new();
    let params = HandlerParams::new("recording", 5, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    let publisher = Publisher::connect(worker.data_url()).await.unwrap();
    for round in 0..3 {
        publisher
            .publish(
                Level::Debug,
                "app",
                &format!("round {round}"),
                "app.rs",
                "f",
                round,
            )
            .unwrap();
        ctl.flush().await.unwrap();
    }
    // An extra flush with nothing queued: the empty drain is clean.
    ctl.flush().await.unwrap();

    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert_eq!(seen.logs.len(), 3);
    assert_eq!(seen.explicit_flushes, 4);
}

#[tokio::test]
async fn unknown_control_commands_surface_to_the_caller() {
    let (handler, _state) = RecordingHandler::new();
    let params = HandlerParams::new("recording", 6, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    let req = ReqSocket::connect(worker.ctrl_url()).unwrap();
    let reply = req.request(Bytes::from_static(b"rotate?")).await;
    assert!(matches!(reply, Err(TransportError::Closed)));

    let err = worker.join().unwrap_err();
    assert!(
        matches!(err.kind(), ErrorKind::UnknownCommand(cmd) if cmd == "rotate?"),
        "got: {}",
        err.chain_string()
    );
}

#[tokio::test]
async fn private_poll_items_are_dispatched_in_the_loop() {
    let (handler, _state) = RecordingHandler::new();
    let mut params = HandlerParams::new("recording", 7, Filters::catch_all(Level::Trace));

    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let seen: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    params.private_items.push(PrivateItem {
        rx,
        callback: Box::new(move |msg| {
            sink.lock().unwrap().push(msg);
            Ok(())
        }),
    });
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    tx.send(Bytes::from_static(b"tick")).await.unwrap();

    let mut waited = Duration::ZERO;
    while seen.lock().unwrap().is_empty() && waited < Duration::from_secs(2) {
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += Duration::from_millis(5);
    }
    assert_eq!(seen.lock().unwrap().as_slice(), &[Bytes::from_static(b"tick")]);

    ctl.exit().await.unwrap();
    worker.join().unwrap();
}

#[tokio::test]
async fn plain_thread_producers_publish_without_a_runtime() {
    let (handler, state) = RecordingHandler::new();
    let params = HandlerParams::new("recording", 8, Filters::catch_all(Level::Trace));
    let worker = spawn_recording(handler, params);

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    ctl.ready().await.unwrap();

    // The data endpoint is bound before the handshake answers, so a plain
    // producer thread can connect without waiting.
    let data_url = worker.data_url().to_string();
    let producer = std::thread::spawn(move || {
        let publisher = Publisher::connect_now(&data_url).unwrap();
        for i in 0..4 {
            publisher
                .publish(Level::Info, "bg.job", &format!("step {i}"), "job.rs", "run", i)
                .unwrap();
        }
    });
    producer.join().unwrap();

    ctl.flush().await.unwrap();
    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let seen = state.lock().unwrap();
    assert_eq!(seen.logs.len(), 4);
    assert_eq!(seen.logs[0].2, "step 0");
    assert_eq!(seen.logs[3].2, "step 3");
}

#[tokio::test]
async fn file_sink_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bus.log");
    let params = HandlerParams::new("file", 9, Filters::catch_all(Level::Debug));

    let worker = HandlerWorker::spawn(Box::new(FileHandler::new(&path)), params).unwrap();

    let ctl = ControlClient::connect(worker.ctrl_url()).await.unwrap();
    let ack = ctl.ready().await.unwrap();
    assert!(ack.error.is_none());

    let publisher = Publisher::connect(worker.data_url()).await.unwrap();
    publisher
        .publish(Level::Warn, "db.pool", "pool exhausted", "pool.rs", "get", 88)
        .unwrap();
    publisher
        .publish(Level::Trace, "db.pool", "below threshold", "pool.rs", "get", 89)
        .unwrap();

    ctl.flush().await.unwrap();
    ctl.exit().await.unwrap();
    worker.join().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("pool exhausted"), "got: {contents}");
    assert!(
        !contents.contains("below threshold"),
        "trace record must be filtered out at debug threshold: {contents}"
    );
    assert!(contents.contains("db.pool"));
    assert!(contents.contains("pool.rs:88"));
}
