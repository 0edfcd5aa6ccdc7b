//! Error types for httpd-runtime

use std::io;
use std::net::SocketAddr;

use httpd_core::ParseResult;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Thread pool construction errors.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker count must be > 0")]
    NoWorkers,

    #[error("queue capacity must be > 0")]
    ZeroCapacity,

    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
}

/// Why a connection's read phase failed. Every variant tears the
/// connection down.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("peer closed the connection")]
    PeerClosed,

    #[error("read buffer full")]
    BufferFull,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a request target could not be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("file not found")]
    NotFound,

    #[error("file is not world-readable")]
    Forbidden,

    #[error("target is a directory")]
    Directory,

    #[error("resolved path exceeds {0} bytes")]
    PathTooLong(usize),

    #[error("failed to open or map file")]
    Internal,
}

impl ResolveError {
    /// Parse outcome reported to the client for this failure.
    pub fn parse_result(self) -> ParseResult {
        match self {
            ResolveError::NotFound => ParseResult::NotFound,
            ResolveError::Forbidden => ParseResult::Forbidden,
            ResolveError::Directory | ResolveError::PathTooLong(_) => ParseResult::Malformed,
            ResolveError::Internal => ParseResult::InternalError,
        }
    }
}
