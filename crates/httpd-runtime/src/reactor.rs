//! # Reactor
//!
//! The single thread that owns the readiness loop:
//!
//! ```text
//!   epoll_wait ─┬─ listener ──► accept until EAGAIN ──► admit (arm read)
//!               ├─ waker    ──► return from run()
//!               └─ conn     ──► take from table
//!                                 ├─ hangup/error ──► close
//!                                 ├─ readable ──► read ──► pool.append
//!                                 └─ writable ──► write ──► rearm / close
//! ```
//!
//! Socket reads and writes only ever happen here. Parsing and response
//! building happen on the pool's workers, which hand the connection back
//! through [`ServerContext::rearm`].

use std::cell::Cell;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::conn::{Connection, WriteStatus};
use crate::context::ServerContext;
use crate::dispatch;
use crate::error::ServerError;
use crate::poller::{Event, Events, Interest, LISTENER_TOKEN, WAKER_TOKEN};
use crate::pool::ThreadPool;
use crate::table::ConnKey;
use crate::waker::{ShutdownHandle, Waker};

/// How long the listener stays out of the epoll set after `accept`
/// fails, unless a connection closes first.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener taken out of the epoll set after an `accept` failure.
#[derive(Debug, Clone, Copy)]
struct AcceptPause {
    since: Instant,
    live: usize,
}

pub struct Reactor {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
    pool: ThreadPool<Box<Connection>>,
    waker: Arc<Waker>,
    events: Events,
    paused: Cell<Option<AcceptPause>>,
}

impl Reactor {
    /// Bind the listener, create epoll, the connection table and the
    /// worker pool.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.socket_addr();
        let listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;

        let ctx = Arc::new(ServerContext::new(&config)?);
        let waker = Arc::new(Waker::new()?);
        ctx.poller().add_source(&listener, LISTENER_TOKEN)?;
        ctx.poller().add_source(&*waker, WAKER_TOKEN)?;

        let worker_ctx = Arc::clone(&ctx);
        let pool = ThreadPool::new(config.num_workers, config.max_requests, move |conn| {
            dispatch::process(&worker_ctx, conn)
        })?;

        info!(
            addr = %listener.local_addr()?,
            doc_root = %config.doc_root.display(),
            "listening"
        );
        Ok(Self {
            listener,
            ctx,
            pool,
            waker,
            events: Events::with_capacity(config.max_events),
            paused: Cell::new(None),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle for stopping [`run`](Reactor::run) from another thread or a
    /// signal handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(Arc::clone(&self.waker))
    }

    pub fn live_connections(&self) -> usize {
        self.ctx.live_connections()
    }

    /// Run the event loop until the shutdown handle fires.
    pub fn run(&mut self) -> Result<(), ServerError> {
        loop {
            let timeout = match self.paused.get() {
                Some(_) => ACCEPT_BACKOFF.as_millis() as i32,
                None => -1,
            };
            self.ctx.poller().wait(&mut self.events, timeout)?;
            self.resume_accepting();
            for ev in self.events.iter() {
                match ev.token() {
                    WAKER_TOKEN => {
                        let _ = self.waker.drain();
                        info!(live = self.ctx.live_connections(), "shutdown requested");
                        return Ok(());
                    }
                    LISTENER_TOKEN => self.accept_all(),
                    _ => self.on_connection(ev),
                }
            }
        }
    }

    fn accept_all(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.ctx.admit(stream, peer);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EMFILE and friends leave the listener readable.
                    warn!(error = %e, "accept failed, pausing accepts");
                    self.pause_accepting();
                    break;
                }
            }
        }
    }

    fn pause_accepting(&self) {
        if self.paused.get().is_some() {
            return;
        }
        if let Err(e) = self.ctx.poller().deregister(&self.listener) {
            warn!(error = %e, "cannot remove listener from epoll");
            return;
        }
        self.paused.set(Some(AcceptPause {
            since: Instant::now(),
            live: self.ctx.live_connections(),
        }));
    }

    /// Put the listener back once a connection has closed or the
    /// backoff has run out.
    fn resume_accepting(&self) {
        let Some(pause) = self.paused.get() else {
            return;
        };
        if self.ctx.live_connections() >= pause.live && pause.since.elapsed() < ACCEPT_BACKOFF {
            return;
        }
        match self.ctx.poller().add_source(&self.listener, LISTENER_TOKEN) {
            Ok(()) => {
                debug!("accepting again");
                self.paused.set(None);
            }
            Err(e) => warn!(error = %e, "cannot re-add listener to epoll"),
        }
    }

    fn on_connection(&self, ev: Event) {
        let key = ConnKey::from_token(ev.token());
        let Some(mut conn) = self.ctx.take(key) else {
            debug!(fd = key.fd(), generation = key.generation(), "event for stale or busy slot");
            return;
        };

        if ev.is_hangup() {
            debug!(peer = %conn.peer(), "peer hung up");
            self.ctx.close(conn);
        } else if ev.is_readable() {
            match conn.read() {
                Ok(_) => {
                    if let Err(conn) = self.pool.append(conn) {
                        warn!(peer = %conn.peer(), pending = self.pool.pending(), "work queue full, dropping connection");
                        self.ctx.close(conn);
                    }
                }
                Err(e) => {
                    debug!(peer = %conn.peer(), error = %e, "read failed");
                    self.ctx.close(conn);
                }
            }
        } else if ev.is_writable() {
            match conn.write() {
                Ok(WriteStatus::Pending) => self.ctx.rearm(conn, Interest::Write),
                Ok(WriteStatus::ReadyForRead) => self.ctx.rearm(conn, Interest::Read),
                Ok(WriteStatus::Close) => self.ctx.close(conn),
                Err(e) => {
                    debug!(peer = %conn.peer(), error = %e, "write failed");
                    self.ctx.close(conn);
                }
            }
        } else {
            self.ctx.close(conn);
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.pool.shutdown();
        debug!(live = self.ctx.live_connections(), "reactor stopped");
    }
}
