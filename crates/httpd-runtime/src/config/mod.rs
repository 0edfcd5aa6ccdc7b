//! Server Configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Command-line flags (applied by the binary through the builders)
//! 2. Environment variables (runtime)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use httpd_runtime::config::ServerConfig;
//!
//! // Use defaults with env overrides
//! let config = ServerConfig::from_env();
//!
//! // Or customize programmatically
//! let config = ServerConfig::from_env()
//!     .port(9000)
//!     .doc_root("/srv/www")
//!     .num_workers(4);
//! ```

pub mod defaults;

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use httpd_core::env::env_get;
use thiserror::Error;
use tracing::info;

/// Server configuration with builder pattern.
///
/// Use `from_env()` to start with compile-time defaults and apply
/// any environment variable overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Listen port (0 picks an ephemeral port)
    pub port: u16,
    /// Directory files are served from
    pub doc_root: PathBuf,
    /// Worker threads
    pub num_workers: usize,
    /// Work queue capacity
    pub max_requests: usize,
    /// Connection table size; bounds accepted descriptor values
    pub max_fds: usize,
    /// Live connection limit
    pub max_connections: usize,
    /// Events per `epoll_wait`
    pub max_events: usize,
    /// Read buffer bytes per connection
    pub read_buffer_size: usize,
    /// Write buffer bytes per connection
    pub write_buffer_size: usize,
    /// Longest resolved path
    pub max_path_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `HTTPD_HOST` - Bind address
    /// - `HTTPD_PORT` - Listen port
    /// - `HTTPD_DOC_ROOT` - Document root
    /// - `HTTPD_WORKERS` - Worker threads
    /// - `HTTPD_MAX_REQUESTS` - Work queue capacity
    /// - `HTTPD_MAX_FD` - Connection table size
    /// - `HTTPD_MAX_CONNECTIONS` - Live connection limit
    /// - `HTTPD_MAX_EVENTS` - Events per wait
    /// - `HTTPD_READ_BUFFER` - Read buffer bytes
    /// - `HTTPD_WRITE_BUFFER` - Write buffer bytes
    /// - `HTTPD_MAX_PATH` - Longest resolved path
    pub fn from_env() -> Self {
        Self {
            host: env_get("HTTPD_HOST", defaults::HOST),
            port: env_get("HTTPD_PORT", defaults::PORT),
            doc_root: env_get("HTTPD_DOC_ROOT", PathBuf::from(defaults::DOC_ROOT)),
            num_workers: env_get("HTTPD_WORKERS", defaults::NUM_WORKERS),
            max_requests: env_get("HTTPD_MAX_REQUESTS", defaults::MAX_REQUESTS),
            max_fds: env_get("HTTPD_MAX_FD", defaults::MAX_FDS),
            max_connections: env_get("HTTPD_MAX_CONNECTIONS", defaults::MAX_CONNECTIONS),
            max_events: env_get("HTTPD_MAX_EVENTS", defaults::MAX_EVENTS),
            read_buffer_size: env_get("HTTPD_READ_BUFFER", defaults::READ_BUFFER_SIZE),
            write_buffer_size: env_get("HTTPD_WRITE_BUFFER", defaults::WRITE_BUFFER_SIZE),
            max_path_len: env_get("HTTPD_MAX_PATH", defaults::MAX_PATH_LEN),
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            host: defaults::HOST,
            port: defaults::PORT,
            doc_root: PathBuf::from(defaults::DOC_ROOT),
            num_workers: defaults::NUM_WORKERS,
            max_requests: defaults::MAX_REQUESTS,
            max_fds: defaults::MAX_FDS,
            max_connections: defaults::MAX_CONNECTIONS,
            max_events: defaults::MAX_EVENTS,
            read_buffer_size: defaults::READ_BUFFER_SIZE,
            write_buffer_size: defaults::WRITE_BUFFER_SIZE,
            max_path_len: defaults::MAX_PATH_LEN,
        }
    }

    // Builder methods

    pub fn host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn doc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.doc_root = root.into();
        self
    }

    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }

    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = n;
        self
    }

    pub fn max_fds(mut self, n: usize) -> Self {
        self.max_fds = n;
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn max_events(mut self, n: usize) -> Self {
        self.max_events = n;
        self
    }

    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    pub fn max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_workers == 0 {
            return Err(ConfigError::InvalidValue("num_workers must be > 0"));
        }
        if self.max_requests == 0 {
            return Err(ConfigError::InvalidValue("max_requests must be > 0"));
        }
        if self.max_fds == 0 {
            return Err(ConfigError::InvalidValue("max_fds must be > 0"));
        }
        if self.max_fds > u32::MAX as usize {
            return Err(ConfigError::InvalidValue("max_fds must fit in 32 bits"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("max_connections must be > 0"));
        }
        if self.max_events == 0 {
            return Err(ConfigError::InvalidValue("max_events must be > 0"));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::InvalidValue("read_buffer_size must be > 0"));
        }
        if self.write_buffer_size == 0 {
            return Err(ConfigError::InvalidValue("write_buffer_size must be > 0"));
        }
        if self.max_path_len == 0 {
            return Err(ConfigError::InvalidValue("max_path_len must be > 0"));
        }
        Ok(())
    }

    /// Log the effective configuration at info level.
    pub fn log(&self) {
        info!(
            addr = %self.socket_addr(),
            doc_root = %self.doc_root.display(),
            workers = self.num_workers,
            max_requests = self.max_requests,
            max_fds = self.max_fds,
            max_connections = self.max_connections,
            max_events = self.max_events,
            read_buffer = self.read_buffer_size,
            write_buffer = self.write_buffer_size,
            max_path = self.max_path_len,
            "server configuration"
        );
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new();
        assert_eq!(config.port, 8080);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.max_requests, 10_000);
        assert_eq!(config.max_fds, 65_535);
        assert_eq!(config.read_buffer_size, 2048);
        assert_eq!(config.write_buffer_size, 1024);
        assert_eq!(config.max_path_len, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_override() {
        std::env::set_var("HTTPD_MAX_EVENTS", "64");
        let config = ServerConfig::from_env();
        assert_eq!(config.max_events, 64);
        std::env::remove_var("HTTPD_MAX_EVENTS");
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new()
            .port(0)
            .doc_root("/srv/www")
            .num_workers(2)
            .max_requests(16);

        assert_eq!(config.port, 0);
        assert_eq!(config.doc_root, PathBuf::from("/srv/www"));
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.max_requests, 16);
        assert_eq!(config.socket_addr().port(), 0);
    }

    #[test]
    fn test_validation() {
        assert!(ServerConfig::new().num_workers(0).validate().is_err());
        assert!(ServerConfig::new().max_requests(0).validate().is_err());
        assert!(ServerConfig::new().max_connections(0).validate().is_err());
        assert_eq!(
            ServerConfig::new().read_buffer_size(0).validate(),
            Err(ConfigError::InvalidValue("read_buffer_size must be > 0"))
        );
    }
}
