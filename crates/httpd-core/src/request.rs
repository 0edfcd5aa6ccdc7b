//! # Request state machine
//!
//! [`RequestParser`] owns a connection's fixed-capacity read buffer and
//! advances through the request one CRLF-terminated line at a time:
//!
//! ```text
//!   RequestLine ──► Header ──► (Content) ──► Complete
//!        │            │            │
//!        └── Malformed / Incomplete at any point
//! ```
//!
//! Bytes may arrive in arbitrarily small fragments. Every call to
//! [`RequestParser::parse`] resumes where the previous call stopped, so
//! the outcome depends only on the concatenated bytes, never on how the
//! socket split them.
//!
//! Lines are tracked as `(start, end)` offsets into the buffer. The
//! buffer itself is never rewritten while parsing; accessors hand out
//! slices of it.

use std::ops::Range;

use tracing::debug;

use crate::status::ParseResult;

/// Parser position within the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Header,
    Content,
}

/// Result of scanning for the next line terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// A full `\r\n`-terminated line is available.
    Found,
    /// A bare `\r` or `\n` was seen.
    Malformed,
    /// No terminator yet (or a trailing `\r` awaiting its `\n`).
    Incomplete,
}

/// Request methods the server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
}

const VERSION_1_1: &[u8] = b"HTTP/1.1";
const ABSOLUTE_PREFIX: &[u8] = b"http://";

/// Incremental HTTP/1.1 request parser over a fixed-size buffer.
///
/// Invariant: `start_line <= checked_index <= read_index <= capacity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParser {
    buf: Box<[u8]>,
    /// One past the last byte received.
    read_index: usize,
    /// One past the last byte examined by the line scanner.
    checked_index: usize,
    /// Start of the line currently being assembled.
    start_line: usize,
    /// End of the most recently found line, terminator excluded.
    line_end: usize,
    check_state: CheckState,
    method: Option<Method>,
    url: Option<Range<usize>>,
    version: Option<Range<usize>>,
    host: Option<Range<usize>>,
    content_length: usize,
    keep_alive: bool,
}

impl RequestParser {
    /// Create a parser with a zeroed read buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_index: 0,
            checked_index: 0,
            start_line: 0,
            line_end: 0,
            check_state: CheckState::RequestLine,
            method: None,
            url: None,
            version: None,
            host: None,
            content_length: 0,
            keep_alive: false,
        }
    }

    // ── Buffer management ──

    /// Unfilled tail of the read buffer. Fill it, then call [`commit`].
    ///
    /// [`commit`]: RequestParser::commit
    #[inline]
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.read_index..]
    }

    /// Record that `n` bytes were written into [`spare_mut`].
    ///
    /// [`spare_mut`]: RequestParser::spare_mut
    #[inline]
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.read_index + n <= self.buf.len());
        self.read_index = (self.read_index + n).min(self.buf.len());
    }

    /// Copy as much of `bytes` as fits. Returns the number copied.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let spare = self.spare_mut();
        let n = bytes.len().min(spare.len());
        spare[..n].copy_from_slice(&bytes[..n]);
        self.commit(n);
        n
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.read_index == self.buf.len()
    }

    #[inline]
    pub fn read_index(&self) -> usize {
        self.read_index
    }

    #[inline]
    pub fn checked_index(&self) -> usize {
        self.checked_index
    }

    #[inline]
    pub fn check_state(&self) -> CheckState {
        self.check_state
    }

    // ── Parsed fields ──

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    /// Request target, starting with `/`.
    pub fn url(&self) -> Option<&[u8]> {
        self.url.clone().map(|r| &self.buf[r])
    }

    pub fn version(&self) -> Option<&[u8]> {
        self.version.clone().map(|r| &self.buf[r])
    }

    pub fn host(&self) -> Option<&[u8]> {
        self.host.clone().map(|r| &self.buf[r])
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Return to the fresh-connection state.
    ///
    /// Only the used prefix of the buffer is zeroed; the rest was never
    /// written.
    pub fn reset(&mut self) {
        self.buf[..self.read_index].fill(0);
        self.read_index = 0;
        self.checked_index = 0;
        self.start_line = 0;
        self.line_end = 0;
        self.check_state = CheckState::RequestLine;
        self.method = None;
        self.url = None;
        self.version = None;
        self.host = None;
        self.content_length = 0;
        self.keep_alive = false;
    }

    // ── Parsing ──

    /// Advance as far as the buffered bytes allow.
    ///
    /// Returns `Incomplete` when more input is needed, `Complete` once
    /// the request (including any declared body) is buffered, and
    /// `Malformed` on a protocol violation.
    pub fn parse(&mut self) -> ParseResult {
        loop {
            if self.check_state == CheckState::Content {
                return self.parse_content();
            }

            match self.scan_line() {
                LineStatus::Found => {}
                LineStatus::Incomplete => return ParseResult::Incomplete,
                LineStatus::Malformed => return ParseResult::Malformed,
            }

            let line = self.start_line..self.line_end;
            self.start_line = self.checked_index;

            match self.dispatch_line(line) {
                ParseResult::Incomplete => continue,
                outcome => return outcome,
            }
        }
    }

    /// Scan `checked_index..read_index` for the next `\r\n`.
    pub fn scan_line(&mut self) -> LineStatus {
        while self.checked_index < self.read_index {
            match self.buf[self.checked_index] {
                b'\r' => {
                    if self.checked_index + 1 == self.read_index {
                        return LineStatus::Incomplete;
                    }
                    if self.buf[self.checked_index + 1] == b'\n' {
                        self.line_end = self.checked_index;
                        self.checked_index += 2;
                        return LineStatus::Found;
                    }
                    return LineStatus::Malformed;
                }
                b'\n' => {
                    if self.checked_index > self.start_line
                        && self.buf[self.checked_index - 1] == b'\r'
                    {
                        self.line_end = self.checked_index - 1;
                        self.checked_index += 1;
                        return LineStatus::Found;
                    }
                    return LineStatus::Malformed;
                }
                _ => self.checked_index += 1,
            }
        }
        LineStatus::Incomplete
    }

    /// Handle one complete line according to the current state.
    ///
    /// `Incomplete` means "keep going". A line reaching the parser while
    /// it waits for body bytes is an internal fault.
    pub fn dispatch_line(&mut self, line: Range<usize>) -> ParseResult {
        match self.check_state {
            CheckState::RequestLine => self.parse_request_line(line),
            CheckState::Header => self.parse_header(line),
            CheckState::Content => ParseResult::InternalError,
        }
    }

    fn parse_request_line(&mut self, line: Range<usize>) -> ParseResult {
        let text = &self.buf[line.clone()];

        let Some(method_end) = find_blank(text) else {
            return ParseResult::Malformed;
        };
        if !text[..method_end].eq_ignore_ascii_case(b"GET") {
            return ParseResult::Malformed;
        }

        let url_start = skip_blanks(text, method_end);
        let Some(url_len) = find_blank(&text[url_start..]) else {
            return ParseResult::Malformed;
        };
        let mut url = url_start..url_start + url_len;

        let version = skip_blanks(text, url.end)..text.len();
        if !text[version.clone()].eq_ignore_ascii_case(VERSION_1_1) {
            return ParseResult::Malformed;
        }

        // Absolute form: drop scheme and authority.
        let target = &text[url.clone()];
        if target.len() >= ABSOLUTE_PREFIX.len()
            && target[..ABSOLUTE_PREFIX.len()].eq_ignore_ascii_case(ABSOLUTE_PREFIX)
        {
            let authority = url.start + ABSOLUTE_PREFIX.len();
            match text[authority..url.end].iter().position(|&b| b == b'/') {
                Some(slash) => url.start = authority + slash,
                None => return ParseResult::Malformed,
            }
        }

        if text.get(url.start) != Some(&b'/') {
            return ParseResult::Malformed;
        }

        self.method = Some(Method::Get);
        self.url = Some(line.start + url.start..line.start + url.end);
        self.version = Some(line.start + version.start..line.start + version.end);
        self.check_state = CheckState::Header;
        ParseResult::Incomplete
    }

    fn parse_header(&mut self, line: Range<usize>) -> ParseResult {
        if line.is_empty() {
            if self.content_length != 0 {
                self.check_state = CheckState::Content;
                return ParseResult::Incomplete;
            }
            return ParseResult::Complete;
        }

        let text = &self.buf[line.clone()];
        if let Some(value) = header_value(text, b"Connection:") {
            if text[value].eq_ignore_ascii_case(b"keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some(value) = header_value(text, b"Content-Length:") {
            self.content_length = leading_decimal(&text[value]);
        } else if let Some(value) = header_value(text, b"Host:") {
            self.host = Some(line.start + value.start..line.start + value.end);
        } else {
            debug!(header = %String::from_utf8_lossy(text), "ignoring unknown header");
        }
        ParseResult::Incomplete
    }

    /// Body bytes are counted, never interpreted.
    fn parse_content(&self) -> ParseResult {
        if self.read_index - self.checked_index >= self.content_length {
            ParseResult::Complete
        } else {
            ParseResult::Incomplete
        }
    }
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn find_blank(text: &[u8]) -> Option<usize> {
    text.iter().position(|&b| is_blank(b))
}

fn skip_blanks(text: &[u8], from: usize) -> usize {
    from + text[from..].iter().take_while(|&&b| is_blank(b)).count()
}

/// Value range of `name` (case-insensitive, including the colon) with
/// leading blanks skipped.
fn header_value(text: &[u8], name: &[u8]) -> Option<Range<usize>> {
    if text.len() < name.len() || !text[..name.len()].eq_ignore_ascii_case(name) {
        return None;
    }
    Some(skip_blanks(text, name.len())..text.len())
}

/// Parse leading ASCII digits; anything else yields what was read so far.
fn leading_decimal(text: &[u8]) -> usize {
    text.iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0usize, |acc, &b| acc.saturating_mul(10).saturating_add((b - b'0') as usize))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITY: usize = 2048;
    const SIMPLE: &[u8] =
        b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: keep-alive\r\n\r\n";

    fn parsed(bytes: &[u8]) -> (RequestParser, ParseResult) {
        let mut p = RequestParser::new(CAPACITY);
        assert_eq!(p.feed(bytes), bytes.len());
        let r = p.parse();
        (p, r)
    }

    fn summary(p: &RequestParser) -> (Option<Vec<u8>>, Option<Vec<u8>>, bool, usize, CheckState) {
        (
            p.url().map(<[u8]>::to_vec),
            p.host().map(<[u8]>::to_vec),
            p.keep_alive(),
            p.content_length(),
            p.check_state(),
        )
    }

    #[test]
    fn test_simple_get() {
        let (p, r) = parsed(SIMPLE);
        assert_eq!(r, ParseResult::Complete);
        assert_eq!(p.method(), Some(Method::Get));
        assert_eq!(p.url(), Some(&b"/index.html"[..]));
        assert_eq!(p.version(), Some(&b"HTTP/1.1"[..]));
        assert_eq!(p.host(), Some(&b"localhost"[..]));
        assert!(p.keep_alive());
        assert_eq!(p.content_length(), 0);
        assert_eq!(p.checked_index(), SIMPLE.len());
    }

    #[test]
    fn test_byte_by_byte() {
        let mut p = RequestParser::new(CAPACITY);
        for (i, b) in SIMPLE.iter().enumerate() {
            p.feed(std::slice::from_ref(b));
            let r = p.parse();
            if i + 1 < SIMPLE.len() {
                assert_eq!(r, ParseResult::Incomplete, "byte {}", i);
            } else {
                assert_eq!(r, ParseResult::Complete);
            }
        }
        let (whole, _) = parsed(SIMPLE);
        assert_eq!(summary(&p), summary(&whole));
    }

    #[test]
    fn test_every_two_way_split() {
        let (whole, _) = parsed(SIMPLE);
        for split in 0..=SIMPLE.len() {
            let mut p = RequestParser::new(CAPACITY);
            p.feed(&SIMPLE[..split]);
            let first = p.parse();
            if split < SIMPLE.len() {
                assert_eq!(first, ParseResult::Incomplete, "split {}", split);
                p.feed(&SIMPLE[split..]);
                assert_eq!(p.parse(), ParseResult::Complete, "split {}", split);
            } else {
                assert_eq!(first, ParseResult::Complete);
            }
            assert_eq!(summary(&p), summary(&whole), "split {}", split);
        }
    }

    #[test]
    fn test_post_is_malformed() {
        let (_, r) = parsed(b"POST /form HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(r, ParseResult::Malformed);
    }

    #[test]
    fn test_wrong_version_is_malformed() {
        let (_, r) = parsed(b"GET / HTTP/1.0\r\n\r\n");
        assert_eq!(r, ParseResult::Malformed);
        let (_, r) = parsed(b"GET / HTTP/1.1 extra\r\n\r\n");
        assert_eq!(r, ParseResult::Malformed);
    }

    #[test]
    fn test_missing_parts_are_malformed() {
        assert_eq!(parsed(b"GET\r\n\r\n").1, ParseResult::Malformed);
        assert_eq!(parsed(b"GET /only-url\r\n\r\n").1, ParseResult::Malformed);
        assert_eq!(parsed(b"GET index.html HTTP/1.1\r\n\r\n").1, ParseResult::Malformed);
    }

    #[test]
    fn test_case_insensitive_method_and_version() {
        let (p, r) = parsed(b"get /a.html http/1.1\r\n\r\n");
        assert_eq!(r, ParseResult::Complete);
        assert_eq!(p.url(), Some(&b"/a.html"[..]));
    }

    #[test]
    fn test_tabs_and_runs_separate_fields() {
        let (p, r) = parsed(b"GET \t /a.html\t\tHTTP/1.1\r\nHost:\t\texample\r\n\r\n");
        assert_eq!(r, ParseResult::Complete);
        assert_eq!(p.url(), Some(&b"/a.html"[..]));
        assert_eq!(p.host(), Some(&b"example"[..]));
    }

    #[test]
    fn test_absolute_form_target() {
        let (p, r) = parsed(b"GET HTTP://example.com:8080/docs/a.html HTTP/1.1\r\n\r\n");
        assert_eq!(r, ParseResult::Complete);
        assert_eq!(p.url(), Some(&b"/docs/a.html"[..]));

        let (_, r) = parsed(b"GET http://example.com HTTP/1.1\r\n\r\n");
        assert_eq!(r, ParseResult::Malformed);
    }

    #[test]
    fn test_bare_line_endings_are_malformed() {
        assert_eq!(parsed(b"GET / HTTP/1.1\n\n").1, ParseResult::Malformed);
        assert_eq!(parsed(b"GET / HTTP/1.1\rX").1, ParseResult::Malformed);
    }

    #[test]
    fn test_trailing_cr_waits_for_lf() {
        let mut p = RequestParser::new(CAPACITY);
        p.feed(b"GET / HTTP/1.1\r");
        assert_eq!(p.scan_line(), LineStatus::Incomplete);
        p.feed(b"\n");
        assert_eq!(p.scan_line(), LineStatus::Found);
        assert_eq!(p.checked_index(), 16);
    }

    #[test]
    fn test_content_length_body() {
        let head = b"GET /upload HTTP/1.1\r\nContent-Length: 5\r\n\r\n";
        let mut p = RequestParser::new(CAPACITY);
        p.feed(head);
        assert_eq!(p.parse(), ParseResult::Incomplete);
        assert_eq!(p.check_state(), CheckState::Content);

        p.feed(b"abcd");
        assert_eq!(p.parse(), ParseResult::Incomplete);
        p.feed(b"e");
        assert_eq!(p.parse(), ParseResult::Complete);
        assert_eq!(p.content_length(), 5);
    }

    #[test]
    fn test_body_bytes_are_not_scanned_for_lines() {
        let head = b"GET / HTTP/1.1\r\ncontent-length: 3\r\n\r\n";
        let mut p = RequestParser::new(CAPACITY);
        p.feed(head);
        p.feed(b"\n\r\n");
        assert_eq!(p.parse(), ParseResult::Complete);
    }

    #[test]
    fn test_content_length_like_atol() {
        let (p, r) = parsed(b"GET / HTTP/1.1\r\nContent-Length: junk\r\n\r\n");
        assert_eq!(r, ParseResult::Complete);
        assert_eq!(p.content_length(), 0);

        let (p, _) = parsed(b"GET / HTTP/1.1\r\nContent-Length: 12abc\r\n\r\n");
        assert_eq!(p.content_length(), 12);
    }

    #[test]
    fn test_connection_close_and_unknown_headers() {
        let (p, r) = parsed(
            b"GET / HTTP/1.1\r\nUser-Agent: curl/8\r\nConnection: close\r\nAccept: */*\r\n\r\n",
        );
        assert_eq!(r, ParseResult::Complete);
        assert!(!p.keep_alive());
        assert!(p.host().is_none());
    }

    #[test]
    fn test_line_in_content_state_is_internal_error() {
        let mut p = RequestParser::new(CAPACITY);
        p.feed(b"GET / HTTP/1.1\r\nContent-Length: 9\r\n\r\n");
        assert_eq!(p.parse(), ParseResult::Incomplete);
        assert_eq!(p.dispatch_line(0..3), ParseResult::InternalError);
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let (mut p, r) = parsed(SIMPLE);
        assert_eq!(r, ParseResult::Complete);
        p.reset();
        assert_eq!(p, RequestParser::new(CAPACITY));

        p.feed(b"GET /second HTTP/1.1\r\n\r\n");
        assert_eq!(p.parse(), ParseResult::Complete);
        assert_eq!(p.url(), Some(&b"/second"[..]));
    }

    #[test]
    fn test_buffer_full() {
        let mut p = RequestParser::new(16);
        assert_eq!(p.feed(b"GET /a-very-long-path HTTP/1.1\r\n"), 16);
        assert!(p.is_full());
        assert!(p.spare_mut().is_empty());
        assert_eq!(p.parse(), ParseResult::Incomplete);
    }

    #[test]
    fn test_spare_and_commit() {
        let mut p = RequestParser::new(64);
        let req = b"GET /x HTTP/1.1\r\n\r\n";
        p.spare_mut()[..req.len()].copy_from_slice(req);
        p.commit(req.len());
        assert_eq!(p.read_index(), req.len());
        assert_eq!(p.parse(), ParseResult::Complete);
    }
}
