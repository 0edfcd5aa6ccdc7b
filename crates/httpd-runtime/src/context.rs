//! Shared server state handed to the reactor and every worker.

use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::atomic::{AtomicUsize, Ordering};

use nix::sys::socket::{setsockopt, sockopt};
use tracing::{debug, error, warn};

use crate::config::ServerConfig;
use crate::conn::Connection;
use crate::poller::{Interest, Poller};
use crate::resolve::DocumentRoot;
use crate::table::{ConnKey, ConnTable};

/// Everything a connection handoff needs: the epoll instance, the
/// connection table, the live-connection count and the document root.
pub struct ServerContext {
    poller: Poller,
    table: ConnTable,
    live: AtomicUsize,
    docroot: DocumentRoot,
    max_connections: usize,
    read_buffer_size: usize,
    write_buffer_size: usize,
}

impl ServerContext {
    pub fn new(config: &ServerConfig) -> std::io::Result<Self> {
        Ok(Self {
            poller: Poller::new()?,
            table: ConnTable::new(config.max_fds),
            live: AtomicUsize::new(0),
            docroot: DocumentRoot::new(&config.doc_root, config.max_path_len),
            max_connections: config.max_connections,
            read_buffer_size: config.read_buffer_size,
            write_buffer_size: config.write_buffer_size,
        })
    }

    #[inline]
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    #[inline]
    pub fn docroot(&self) -> &DocumentRoot {
        &self.docroot
    }

    #[inline]
    pub fn table(&self) -> &ConnTable {
        &self.table
    }

    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Admit a freshly accepted socket: table slot, socket options,
    /// one-shot read registration.
    ///
    /// Returns `false` when the socket was refused and closed. Refusal
    /// is silent on the wire.
    pub fn admit(&self, stream: TcpStream, peer: SocketAddr) -> bool {
        if self.live.load(Ordering::Acquire) >= self.max_connections {
            warn!(%peer, limit = self.max_connections, "connection limit reached, refusing");
            return false;
        }
        let fd = stream.as_raw_fd();
        let Some(key) = self.table.reserve(fd) else {
            warn!(%peer, fd, capacity = self.table.capacity(), "descriptor outside connection table, refusing");
            return false;
        };
        self.live.fetch_add(1, Ordering::AcqRel);

        let conn = Box::new(Connection::new(
            stream,
            peer,
            key,
            self.read_buffer_size,
            self.write_buffer_size,
        ));
        if let Err(e) = conn.stream().set_nonblocking(true) {
            warn!(%peer, error = %e, "set_nonblocking failed");
            self.close(conn);
            return false;
        }
        if let Err(e) = setsockopt(conn.stream(), sockopt::ReuseAddr, &true) {
            debug!(%peer, error = %e, "SO_REUSEADDR failed");
        }

        debug!(%peer, fd, generation = key.generation(), "connection accepted");
        self.arm(conn, Interest::Read, true)
    }

    /// Take the connection an event was delivered for.
    pub fn take(&self, key: ConnKey) -> Option<Box<Connection>> {
        self.table.take(key)
    }

    /// Park the connection and re-enable its one-shot registration.
    pub fn rearm(&self, conn: Box<Connection>, interest: Interest) {
        self.arm(conn, interest, false);
    }

    fn arm(&self, conn: Box<Connection>, interest: Interest, first: bool) -> bool {
        let key = conn.key();
        if let Err(conn) = self.table.park(conn) {
            self.close(conn);
            return false;
        }

        // SAFETY: the descriptor belongs to the connection just parked.
        // It stays open until that connection is taken back out, which
        // needs either an event on this registration or the failure
        // path below.
        let fd = unsafe { BorrowedFd::borrow_raw(key.fd()) };
        let armed = if first {
            self.poller.register(fd, key.token(), interest)
        } else {
            self.poller.rearm(fd, key.token(), interest)
        };
        match armed {
            Ok(()) => true,
            Err(e) => {
                error!(fd = key.fd(), ?interest, error = %e, "epoll registration failed");
                if let Some(conn) = self.table.take(key) {
                    self.close(conn);
                }
                false
            }
        }
    }

    /// Tear down: deregister, free the slot, drop (unmapping any file
    /// and closing the socket).
    pub fn close(&self, conn: Box<Connection>) {
        let key = conn.key();
        // Not registered yet if admission failed early.
        let _ = self.poller.deregister(conn.stream());
        self.table.release(key);
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(peer = %conn.peer(), fd = key.fd(), "connection closed");
        drop(conn);
    }
}
