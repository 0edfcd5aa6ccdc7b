//! Parse outcomes and the response status table.

use std::fmt;

/// Outcome of one pass of the request state machine (plus resource
/// resolution, which the runtime performs once a request is complete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseResult {
    /// More bytes are needed before anything can be decided.
    Incomplete,
    /// Request line and headers (and body, if any) are fully buffered.
    Complete,
    /// Protocol violation: bad request line, bad line ending, directory target.
    Malformed,
    /// Target path does not exist.
    NotFound,
    /// Target exists but is not world-readable.
    Forbidden,
    /// Target is mapped and ready to be sent.
    FileReady,
    /// The server could not complete the request.
    InternalError,
}

impl ParseResult {
    /// Response status for a terminal outcome.
    ///
    /// `Incomplete` and `Complete` produce no response and map to `None`.
    pub fn status(self) -> Option<StatusCode> {
        match self {
            ParseResult::Incomplete | ParseResult::Complete => None,
            ParseResult::FileReady => Some(StatusCode::Ok),
            ParseResult::Malformed => Some(StatusCode::BadRequest),
            ParseResult::Forbidden => Some(StatusCode::Forbidden),
            ParseResult::NotFound => Some(StatusCode::NotFound),
            ParseResult::InternalError => Some(StatusCode::InternalError),
        }
    }
}

/// Status codes the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    InternalError = 500,
}

impl StatusCode {
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Title placed after the code on the status line.
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Fixed body sent with error responses. `Ok` carries the file instead.
    pub fn canned_body(self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => {
                Some("Your request has bad syntax or is inherently impossible to satisfy.\n")
            }
            StatusCode::Forbidden => {
                Some("You do not have permission to get file from this server.\n")
            }
            StatusCode::NotFound => Some("The requested file was not found on this server.\n"),
            StatusCode::InternalError => {
                Some("There was an unusual problem serving the requested file.\n")
            }
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason_phrase())
    }
}
