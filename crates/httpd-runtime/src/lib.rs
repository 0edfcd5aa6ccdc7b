//! # httpd-runtime
//!
//! Linux runtime for the httpd static file server.
//!
//! This crate provides:
//! - Configuration with environment overrides
//! - The epoll [`Poller`] with one-shot re-arming
//! - The [`ConnTable`] arena and per-socket [`Connection`] state
//! - A bounded [`ThreadPool`] for request processing
//! - The [`Reactor`] event loop and its shutdown plumbing
//!
//! # Example
//!
//! ```rust,ignore
//! use httpd_runtime::{signal, Reactor, ServerConfig};
//!
//! signal::ignore_sigpipe()?;
//! let mut reactor = Reactor::new(ServerConfig::from_env().port(8080))?;
//! signal::install_shutdown_handler(&reactor.shutdown_handle())?;
//! reactor.run()?;
//! ```

pub mod config;
pub mod error;
pub mod pool;
pub mod semaphore;

pub use config::ServerConfig;
pub use error::{PoolError, ReadError, ResolveError, ServerError};
pub use pool::ThreadPool;

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod conn;
        pub mod context;
        pub mod dispatch;
        pub mod mapped;
        pub mod poller;
        pub mod reactor;
        pub mod resolve;
        pub mod signal;
        pub mod table;
        pub mod waker;

        pub use conn::{Connection, WriteStatus};
        pub use context::ServerContext;
        pub use mapped::MappedFile;
        pub use poller::{Interest, Poller};
        pub use reactor::Reactor;
        pub use resolve::DocumentRoot;
        pub use table::{ConnKey, ConnTable};
        pub use waker::ShutdownHandle;
    } else {
        compile_error!("httpd-runtime requires Linux (epoll, eventfd)");
    }
}
