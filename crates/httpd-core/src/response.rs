//! Response header builder.
//!
//! The status line, headers and (for error responses) the canned body
//! are formatted into a fixed-capacity buffer. A 200 response carries
//! only headers here; the file body is sent straight from its mapping
//! as the second scatter-gather segment.

use std::fmt::{self, Write as _};

use crate::error::{ResponseError, ResponseResult};
use crate::status::{ParseResult, StatusCode};

/// Fixed-capacity write buffer for status line, headers and canned bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBuffer {
    buf: Box<[u8]>,
    write_index: usize,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_index: 0,
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.write_index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.write_index
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.write_index == 0
    }

    pub fn reset(&mut self) {
        self.buf[..self.write_index].fill(0);
        self.write_index = 0;
    }

    /// Format the response for a terminal parse outcome.
    ///
    /// `file_len` is the size of the mapped file and is only consulted
    /// for `FileReady`. On error nothing is committed beyond what earlier
    /// appends already wrote; the caller abandons the response.
    pub fn build(
        &mut self,
        outcome: ParseResult,
        keep_alive: bool,
        file_len: usize,
    ) -> ResponseResult<StatusCode> {
        let status = outcome.status().ok_or(ResponseError::NotTerminal)?;
        let body = status.canned_body();
        let content_length = body.map_or(file_len, str::len);

        self.add_status_line(status)?;
        self.add_headers(content_length, keep_alive)?;
        if let Some(body) = body {
            self.add_content(body)?;
        }
        Ok(status)
    }

    pub fn add_status_line(&mut self, status: StatusCode) -> ResponseResult<()> {
        self.append(format_args!("HTTP/1.1 {} {}\r\n", status.code(), status.reason_phrase()))
    }

    pub fn add_headers(&mut self, content_length: usize, keep_alive: bool) -> ResponseResult<()> {
        self.append(format_args!("Content-Length: {}\r\n", content_length))?;
        self.append(format_args!("Content-Type: text/html\r\n"))?;
        self.append(format_args!(
            "Connection: {}\r\n",
            if keep_alive { "keep-alive" } else { "close" }
        ))?;
        self.append(format_args!("\r\n"))
    }

    pub fn add_content(&mut self, content: &str) -> ResponseResult<()> {
        self.append(format_args!("{}", content))
    }

    /// Append formatted text, failing without advancing on overflow.
    fn append(&mut self, args: fmt::Arguments<'_>) -> ResponseResult<()> {
        let mut w = SliceWriter {
            buf: &mut self.buf[self.write_index..],
            pos: 0,
            needed: 0,
        };
        // SliceWriter never fails; overflow is detected from `needed`.
        let _ = w.write_fmt(args);
        if w.needed > w.buf.len() {
            return Err(ResponseError::Overflow {
                needed: self.write_index + w.needed,
                capacity: self.buf.len(),
            });
        }
        self.write_index += w.pos;
        Ok(())
    }
}

struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    needed: usize,
}

impl fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.needed += s.len();
        let end = self.pos + s.len();
        if self.needed == end && end <= self.buf.len() {
            self.buf[self.pos..end].copy_from_slice(s.as_bytes());
            self.pos = end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(r: &ResponseBuffer) -> &str {
        std::str::from_utf8(r.as_bytes()).unwrap()
    }

    #[test]
    fn test_file_ready_headers_only() {
        let mut r = ResponseBuffer::new(1024);
        let status = r.build(ParseResult::FileReady, true, 4096).unwrap();
        assert_eq!(status, StatusCode::Ok);
        assert_eq!(
            text(&r),
            "HTTP/1.1 200 OK\r\n\
             Content-Length: 4096\r\n\
             Content-Type: text/html\r\n\
             Connection: keep-alive\r\n\
             \r\n"
        );
    }

    #[test]
    fn test_error_carries_canned_body() {
        let mut r = ResponseBuffer::new(1024);
        r.build(ParseResult::NotFound, false, 999).unwrap();
        let body = "The requested file was not found on this server.\n";
        let expected = format!(
            "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        assert_eq!(text(&r), expected);
    }

    #[test]
    fn test_all_error_statuses() {
        for (outcome, line) in [
            (ParseResult::Malformed, "HTTP/1.1 400 Bad Request\r\n"),
            (ParseResult::Forbidden, "HTTP/1.1 403 Forbidden\r\n"),
            (ParseResult::InternalError, "HTTP/1.1 500 Internal Error\r\n"),
        ] {
            let mut r = ResponseBuffer::new(1024);
            r.build(outcome, false, 0).unwrap();
            assert!(text(&r).starts_with(line));
            assert!(text(&r).ends_with(outcome.status().unwrap().canned_body().unwrap()));
        }
    }

    #[test]
    fn test_non_terminal_has_no_response() {
        let mut r = ResponseBuffer::new(1024);
        assert_eq!(r.build(ParseResult::Incomplete, true, 0), Err(ResponseError::NotTerminal));
        assert_eq!(r.build(ParseResult::Complete, true, 0), Err(ResponseError::NotTerminal));
        assert!(r.is_empty());
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut r = ResponseBuffer::new(40);
        let err = r.build(ParseResult::Malformed, true, 0).unwrap_err();
        match err {
            ResponseError::Overflow { needed, capacity } => {
                assert_eq!(capacity, 40);
                assert!(needed > 40);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(r.len() <= 40);
    }

    #[test]
    fn test_append_exact_fit() {
        let mut r = ResponseBuffer::new(17);
        r.add_status_line(StatusCode::Ok).unwrap();
        assert_eq!(r.len(), 17);
        assert!(r.add_content("x").is_err());
        assert_eq!(r.len(), 17);
    }

    #[test]
    fn test_reset() {
        let mut r = ResponseBuffer::new(256);
        r.build(ParseResult::FileReady, false, 1).unwrap();
        r.reset();
        assert_eq!(r, ResponseBuffer::new(256));
    }
}
