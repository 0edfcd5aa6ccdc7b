//! Process signal disposition.
//!
//! - `SIGPIPE` is ignored so a write to a reset peer surfaces as
//!   `EPIPE` on that connection instead of killing the process.
//! - `SIGINT` / `SIGTERM` wake the reactor through its eventfd.

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, PoisonError};

use nix::sys::signal::{sigaction, signal, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::waker::{wake_raw, ShutdownHandle};

/// Descriptor the handler writes to; -1 when none is installed.
static SHUTDOWN_FD: AtomicI32 = AtomicI32::new(-1);
/// Keeps the installed handle's eventfd open.
static SHUTDOWN_HANDLE: Mutex<Option<ShutdownHandle>> = Mutex::new(None);

/// Ignore `SIGPIPE` for the whole process.
pub fn ignore_sigpipe() -> io::Result<()> {
    // SAFETY: SIG_IGN installs no Rust code as a handler.
    unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) }?;
    Ok(())
}

extern "C" fn on_shutdown_signal(_signum: libc::c_int) {
    let fd: RawFd = SHUTDOWN_FD.load(Ordering::Acquire);
    if fd >= 0 {
        let _ = wake_raw(fd);
    }
}

/// Route `SIGINT` and `SIGTERM` to `handle`.
///
/// Replaces any previously installed handle.
pub fn install_shutdown_handler(handle: &ShutdownHandle) -> io::Result<()> {
    {
        let mut slot = SHUTDOWN_HANDLE
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        SHUTDOWN_FD.store(handle.raw_fd(), Ordering::Release);
        *slot = Some(handle.clone());
    }

    let action = SigAction::new(
        SigHandler::Handler(on_shutdown_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only loads an atomic and calls write(2).
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}
