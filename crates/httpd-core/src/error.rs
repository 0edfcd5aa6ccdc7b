//! Error types for httpd-core

use thiserror::Error;

/// Errors raised while building a response into the write buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Appending would exceed the write buffer's capacity.
    #[error("response header overflows write buffer ({needed} bytes needed, {capacity} available)")]
    Overflow { needed: usize, capacity: usize },

    /// The parse outcome has no response (`Incomplete` / `Complete`).
    #[error("no response defined for non-terminal outcome")]
    NotTerminal,
}

/// Result type for response building
pub type ResponseResult<T> = std::result::Result<T, ResponseError>;
