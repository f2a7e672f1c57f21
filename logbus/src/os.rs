// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Returns the OS-level id of the current thread. Diagnostic only.
#[cfg(target_os = "linux")]
pub fn thread_id() -> i64 {
    // SAFETY: syscall(SYS_gettid) has no preconditions for the current thread.
    unsafe { libc::syscall(libc::SYS_gettid) as i64 }
}

/// Returns the OS-level id of the current thread. Diagnostic only.
#[cfg(not(target_os = "linux"))]
pub fn thread_id() -> i64 {
    0
}

/// Blocks every maskable signal for the calling thread. Asynchronous signals
/// (INT, QUIT, TERM, …) are then handled by whichever thread the embedder
/// dedicates to them; synchronous signals (SEGV, BUS, FPE, ILL) are still
/// delivered to the thread that raised them and are not recoverable here.
#[cfg(unix)]
pub fn mask_signals() -> std::io::Result<()> {
    nix::sys::signal::SigSet::all()
        .thread_block()
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
}

#[cfg(not(unix))]
pub fn mask_signals() -> std::io::Result<()> {
    Ok(())
}
