//! `Waker` — eventfd registered in the reactor's epoll set.
//!
//! Writing to the eventfd makes `epoll_wait` return with the waker
//! token, which the reactor treats as a stop request. Multiple wakes
//! before the reactor drains the counter coalesce into one event.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

pub struct Waker {
    fd: OwnedFd,
}

impl Waker {
    /// Create a non-blocking, close-on-exec eventfd.
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: eventfd just returned this descriptor and nothing else owns it.
        Ok(Self { fd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    /// Bump the counter.
    pub fn wake(&self) -> io::Result<()> {
        wake_raw(self.fd.as_raw_fd())
    }

    /// Reset the counter, returning how many wakes were pending.
    pub fn drain(&self) -> io::Result<u64> {
        let mut val: u64 = 0;
        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(val)
    }
}

/// Async-signal-safe wake: a single `write(2)` of a `u64` 1.
///
/// `EAGAIN` means the counter is saturated, so a wake is already pending.
pub(crate) fn wake_raw(fd: RawFd) -> io::Result<()> {
    let val: u64 = 1;
    let ret = unsafe {
        libc::write(
            fd,
            &val as *const u64 as *const libc::c_void,
            std::mem::size_of::<u64>(),
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(());
        }
        return Err(err);
    }
    Ok(())
}

impl AsFd for Waker {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Cloneable handle that stops a running reactor from any thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self { waker }
    }

    /// Ask the reactor to return from `run()`.
    pub fn shutdown(&self) -> io::Result<()> {
        self.waker.wake()
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.waker.as_raw_fd()
    }
}
