// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::filter::Filters;

pub const DEFAULT_HWM: usize = 1000;
pub const DEFAULT_FLUSH_FREQ: Duration = Duration::from_millis(1000);
pub const DEFAULT_IERR_MAX: usize = 10;

mod parse_env {
    use std::{env, str::FromStr, time::Duration};

    pub fn int<T: FromStr>(name: &str) -> Option<T> {
        env::var(name).ok()?.parse::<T>().ok()
    }

    pub fn duration_ms(name: &str) -> Option<Duration> {
        Some(Duration::from_millis(env::var(name).ok()?.parse().ok()?))
    }
}

/// Process-wide id generator keeping in-process addresses unique across
/// parameter instances, so several handlers of the same kind can coexist.
fn next_endpoint_uid() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Callback invoked for each message received on a private poll item.
pub type PrivateCallback = Box<dyn FnMut(Bytes) -> anyhow::Result<()> + Send>;

/// An extra pollable resource a sink can attach to the worker loop, paired
/// with the callback that handles its messages.
pub struct PrivateItem {
    pub rx: mpsc::Receiver<Bytes>,
    pub callback: PrivateCallback,
}

impl std::fmt::Debug for PrivateItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateItem").finish_non_exhaustive()
    }
}

/// Everything a handler worker needs to run: channel bounds, flush cadence,
/// identity, addresses and the filter list.
///
/// Built with defaults plus environment overrides (`LOGBUS_DATA_HWM`,
/// `LOGBUS_CTRL_HWM`, `LOGBUS_FLUSH_FREQ_MS`, `LOGBUS_IERR_MAX`); individual
/// fields can then be adjusted before spawning the worker.
#[derive(Debug)]
pub struct HandlerParams {
    /// Receive high-water mark of the data endpoint.
    pub data_hwm: usize,
    /// Receive high-water mark of the control endpoint.
    pub ctrl_hwm: usize,
    /// Upper bound on wall time between implicit flushes.
    pub flush_freq: Duration,
    /// Internal-error budget; the loop gives up once it is exhausted.
    pub ierr_max: usize,
    /// Identity echoed in the readiness reply and attached to the data
    /// endpoint.
    pub rank: u32,
    pub ctrl_url: String,
    pub data_url: String,
    pub filters: Filters,
    pub private_items: Vec<PrivateItem>,
}

impl HandlerParams {
    pub fn new(handler_name: &str, rank: u32, filters: Filters) -> Self {
        let uid = next_endpoint_uid();
        Self {
            data_hwm: parse_env::int("LOGBUS_DATA_HWM").unwrap_or(DEFAULT_HWM),
            ctrl_hwm: parse_env::int("LOGBUS_CTRL_HWM").unwrap_or(DEFAULT_HWM),
            flush_freq: parse_env::duration_ms("LOGBUS_FLUSH_FREQ_MS")
                .unwrap_or(DEFAULT_FLUSH_FREQ),
            ierr_max: parse_env::int("LOGBUS_IERR_MAX").unwrap_or(DEFAULT_IERR_MAX),
            rank,
            ctrl_url: format!("inproc://{handler_name}/{uid}.ctrl"),
            data_url: format!("inproc://{handler_name}/{uid}.data"),
            filters,
            private_items: Vec::new(),
        }
    }

    /// Identity bytes as sent on the wire.
    pub fn rank_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.rank.to_le_bytes())
    }
}
