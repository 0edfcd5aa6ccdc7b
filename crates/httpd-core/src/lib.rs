//! # httpd-core
//!
//! Platform-agnostic protocol logic for httpd.
//!
//! This crate contains everything that does not touch a socket or the
//! kernel's readiness machinery:
//!
//! - [`RequestParser`]: the incremental HTTP/1.1 request state machine
//! - [`ResponseBuffer`]: fixed-capacity status line and header writer
//! - [`ParseResult`] / [`StatusCode`]: parse outcomes and the status table
//! - [`env`]: environment variable helpers used by the config layer
//!
//! The runtime crate (`httpd-runtime`) drives these types from its
//! epoll reactor and worker pool.

pub mod env;
pub mod error;
pub mod request;
pub mod response;
pub mod status;

pub use error::{ResponseError, ResponseResult};
pub use request::{CheckState, LineStatus, Method, RequestParser};
pub use response::ResponseBuffer;
pub use status::{ParseResult, StatusCode};
