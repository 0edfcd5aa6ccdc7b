//! `Poller` — thin wrapper over an epoll instance.
//!
//! Connection descriptors are always registered `EPOLLONESHOT`: after
//! one event is delivered the descriptor stays disabled until it is
//! re-armed with [`Poller::rearm`]. That gives a single owner per
//! readiness event, which the connection table turns into ownership of
//! the connection itself.
//!
//! The listener and the waker are level-triggered and never disarmed.

use std::io;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Token reserved for the listening socket.
pub const LISTENER_TOKEN: u64 = u64::MAX;
/// Token reserved for the shutdown waker.
pub const WAKER_TOKEN: u64 = u64::MAX - 1;

const READ_FLAGS: u32 = (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
const WRITE_FLAGS: u32 = (libc::EPOLLOUT | libc::EPOLLRDHUP | libc::EPOLLONESHOT) as u32;
const HANGUP_FLAGS: u32 = (libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32;

/// Direction a one-shot registration waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl Interest {
    fn flags(self) -> u32 {
        match self {
            Interest::Read => READ_FLAGS,
            Interest::Write => WRITE_FLAGS,
        }
    }
}

/// One ready descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    token: u64,
    flags: u32,
}

impl Event {
    #[inline]
    pub fn token(&self) -> u64 {
        self.token
    }

    #[inline]
    pub fn is_readable(&self) -> bool {
        self.flags & libc::EPOLLIN as u32 != 0
    }

    #[inline]
    pub fn is_writable(&self) -> bool {
        self.flags & libc::EPOLLOUT as u32 != 0
    }

    /// Peer hangup, full hangup or socket error.
    #[inline]
    pub fn is_hangup(&self) -> bool {
        self.flags & HANGUP_FLAGS != 0
    }
}

/// Reusable ready list for [`Poller::wait`].
pub struct Events {
    buf: Vec<libc::epoll_event>,
    len: usize,
}

impl Events {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![libc::epoll_event { events: 0, u64: 0 }; capacity.max(1)],
            len: 0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.buf[..self.len].iter().map(|e| Event {
            token: e.u64,
            flags: e.events,
        })
    }
}

pub struct Poller {
    epfd: OwnedFd,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: epoll_create1 returned a fresh descriptor we now own.
        Ok(Self { epfd: unsafe { OwnedFd::from_raw_fd(fd) } })
    }

    /// Register a level-triggered read source (listener, waker).
    pub fn add_source<F: AsFd>(&self, fd: F, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd.as_fd().as_raw_fd(), libc::EPOLLIN as u32, token)
    }

    /// First one-shot registration of a connection.
    pub fn register<F: AsFd>(&self, fd: F, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd.as_fd().as_raw_fd(), interest.flags(), token)
    }

    /// Re-enable a one-shot registration after its event was consumed.
    pub fn rearm<F: AsFd>(&self, fd: F, token: u64, interest: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd.as_fd().as_raw_fd(), interest.flags(), token)
    }

    pub fn deregister<F: AsFd>(&self, fd: F) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd.as_fd().as_raw_fd(), 0, 0)
    }

    /// Block until at least one descriptor is ready, or `timeout_ms`
    /// elapses (`-1` waits forever). An interrupted wait reports zero
    /// events.
    pub fn wait(&self, events: &mut Events, timeout_ms: i32) -> io::Result<usize> {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd.as_raw_fd(),
                events.buf.as_mut_ptr(),
                events.buf.len().min(i32::MAX as usize) as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            events.len = 0;
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        events.len = n as usize;
        Ok(events.len)
    }

    fn ctl(&self, op: i32, fd: RawFd, flags: u32, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event { events: flags, u64: token };
        let ret = unsafe { libc::epoll_ctl(self.epfd.as_raw_fd(), op, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waker::Waker;

    #[test]
    fn test_level_triggered_source() {
        let poller = Poller::new().unwrap();
        let waker = Waker::new().unwrap();
        poller.add_source(&waker, WAKER_TOKEN).unwrap();

        let mut events = Events::with_capacity(4);
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 0);

        waker.wake().unwrap();
        assert_eq!(poller.wait(&mut events, 1000).unwrap(), 1);
        let ev = events.iter().next().unwrap();
        assert_eq!(ev.token(), WAKER_TOKEN);
        assert!(ev.is_readable());
        assert!(!ev.is_hangup());

        // Still readable until drained.
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 1);
        waker.drain().unwrap();
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 0);
    }

    #[test]
    fn test_oneshot_needs_rearm() {
        let poller = Poller::new().unwrap();
        let waker = Waker::new().unwrap();
        poller.register(&waker, 42, Interest::Read).unwrap();
        waker.wake().unwrap();

        let mut events = Events::with_capacity(4);
        assert_eq!(poller.wait(&mut events, 1000).unwrap(), 1);
        assert_eq!(events.iter().next().unwrap().token(), 42);

        // Disabled after one delivery even though still readable.
        assert_eq!(poller.wait(&mut events, 0).unwrap(), 0);

        poller.rearm(&waker, 43, Interest::Read).unwrap();
        assert_eq!(poller.wait(&mut events, 1000).unwrap(), 1);
        assert_eq!(events.iter().next().unwrap().token(), 43);

        poller.deregister(&waker).unwrap();
        assert!(poller.rearm(&waker, 44, Interest::Read).is_err());
    }

    #[test]
    fn test_write_interest() {
        let poller = Poller::new().unwrap();
        let waker = Waker::new().unwrap();
        poller.register(&waker, 7, Interest::Write).unwrap();
        let mut events = Events::with_capacity(1);
        assert_eq!(poller.wait(&mut events, 1000).unwrap(), 1);
        let ev = events.iter().next().unwrap();
        assert!(ev.is_writable());
        assert!(!ev.is_readable());
    }
}
