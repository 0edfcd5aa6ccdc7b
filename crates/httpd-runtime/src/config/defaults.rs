//! Compile-time defaults for [`ServerConfig`](super::ServerConfig).

use std::net::{IpAddr, Ipv4Addr};

/// Bind address (all interfaces)
pub const HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Listen port
pub const PORT: u16 = 8080;

/// Document root, relative to the working directory
pub const DOC_ROOT: &str = "./resources";

/// Worker threads in the pool
pub const NUM_WORKERS: usize = 8;

/// Pending jobs the work queue holds before rejecting
pub const MAX_REQUESTS: usize = 10_000;

/// Connection table slots; descriptors at or above this are refused
pub const MAX_FDS: usize = 65_535;

/// Live connection limit
pub const MAX_CONNECTIONS: usize = 65_535;

/// Ready events fetched per `epoll_wait`
pub const MAX_EVENTS: usize = 10_000;

/// Per-connection read buffer
pub const READ_BUFFER_SIZE: usize = 2048;

/// Per-connection write buffer (status line, headers, canned body)
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Longest resolved file path, document root included
pub const MAX_PATH_LEN: usize = 200;
