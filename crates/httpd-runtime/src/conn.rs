//! Per-socket connection state.
//!
//! The reactor thread performs the socket I/O ([`Connection::read`],
//! [`Connection::write`]); a worker runs the protocol half
//! ([`Connection::process_read`], [`Connection::process_write`]). The
//! two never overlap because the connection is moved between them as a
//! `Box`, never shared.

use std::io::{self, IoSlice, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use httpd_core::{ParseResult, RequestParser, ResponseBuffer, ResponseResult};
use tracing::debug;

use crate::error::ReadError;
use crate::mapped::MappedFile;
use crate::resolve::DocumentRoot;
use crate::table::ConnKey;

/// What the reactor should do after [`Connection::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Socket buffer full; re-arm for write.
    Pending,
    /// Response flushed (or nothing was queued); state reset, re-arm for read.
    ReadyForRead,
    /// Response flushed without keep-alive; tear down.
    Close,
}

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    key: ConnKey,
    request: RequestParser,
    response: ResponseBuffer,
    /// Body of an in-flight 200 response.
    file: Option<MappedFile>,
    bytes_to_send: usize,
    bytes_sent: usize,
    /// 1 = headers only, 2 = headers + file.
    iov_count: usize,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        key: ConnKey,
        read_buffer_size: usize,
        write_buffer_size: usize,
    ) -> Self {
        Self {
            stream,
            peer,
            key,
            request: RequestParser::new(read_buffer_size),
            response: ResponseBuffer::new(write_buffer_size),
            file: None,
            bytes_to_send: 0,
            bytes_sent: 0,
            iov_count: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> ConnKey {
        self.key
    }

    #[inline]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[inline]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn request(&self) -> &RequestParser {
        &self.request
    }

    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    pub fn bytes_to_send(&self) -> usize {
        self.bytes_to_send
    }

    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    /// Back to the freshly-accepted state. Drops any mapping.
    pub fn reset(&mut self) {
        self.request.reset();
        self.response.reset();
        self.file = None;
        self.bytes_to_send = 0;
        self.bytes_sent = 0;
        self.iov_count = 0;
    }

    // ── Reactor side ──

    /// Drain the socket into the read buffer until it would block.
    ///
    /// Returns the number of bytes read in this call.
    pub fn read(&mut self) -> Result<usize, ReadError> {
        let mut total = 0;
        loop {
            let spare = self.request.spare_mut();
            if spare.is_empty() {
                if total > 0 {
                    break;
                }
                return Err(ReadError::BufferFull);
            }
            match self.stream.read(spare) {
                Ok(0) => return Err(ReadError::PeerClosed),
                Ok(n) => {
                    self.request.commit(n);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::Io(e)),
            }
        }
        Ok(total)
    }

    /// Send the queued response with `writev` until done or would-block.
    ///
    /// Both segments are recomputed from `bytes_sent` on every pass, so
    /// a short write that stops inside the headers, or straddles the
    /// headers and the file, resumes at the right byte.
    pub fn write(&mut self) -> io::Result<WriteStatus> {
        if self.bytes_to_send == 0 {
            self.reset();
            return Ok(WriteStatus::ReadyForRead);
        }

        loop {
            let header = self.response.as_bytes();
            let body = match (&self.file, self.iov_count) {
                (Some(file), 2) => file.as_slice(),
                _ => &[][..],
            };
            let (head_part, body_part) = if self.bytes_sent < header.len() {
                (&header[self.bytes_sent..], body)
            } else {
                (&[][..], &body[self.bytes_sent - header.len()..])
            };
            let iov = [IoSlice::new(head_part), IoSlice::new(body_part)];

            match self.stream.write_vectored(&iov) {
                Ok(0) => {
                    self.file = None;
                    return Err(io::ErrorKind::WriteZero.into());
                }
                Ok(n) => {
                    self.bytes_sent += n;
                    self.bytes_to_send = self.bytes_to_send.saturating_sub(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.file = None;
                    return Err(e);
                }
            }

            if self.bytes_to_send == 0 {
                self.file = None;
                if self.request.keep_alive() {
                    self.reset();
                    return Ok(WriteStatus::ReadyForRead);
                }
                return Ok(WriteStatus::Close);
            }
        }
    }

    // ── Worker side ──

    /// Parse what has been read so far; on a complete request, resolve
    /// and map the target.
    pub fn process_read(&mut self, docroot: &DocumentRoot) -> ParseResult {
        let outcome = self.request.parse();
        if outcome != ParseResult::Complete {
            return outcome;
        }
        let Some(url) = self.request.url() else {
            return ParseResult::InternalError;
        };
        match docroot.open(url) {
            Ok(file) => {
                debug!(peer = %self.peer, url = %String::from_utf8_lossy(url), len = file.len(), "serving file");
                self.file = Some(file);
                ParseResult::FileReady
            }
            Err(e) => {
                debug!(peer = %self.peer, url = %String::from_utf8_lossy(url), error = %e, "cannot serve");
                e.parse_result()
            }
        }
    }

    /// Build the response for a terminal outcome and queue it.
    pub fn process_write(&mut self, outcome: ParseResult) -> ResponseResult<()> {
        let file_len = self.file.as_ref().map_or(0, MappedFile::len);
        if let Err(e) = self.response.build(outcome, self.request.keep_alive(), file_len) {
            self.file = None;
            return Err(e);
        }
        self.bytes_sent = 0;
        if outcome == ParseResult::FileReady && self.file.is_some() {
            self.iov_count = 2;
            self.bytes_to_send = self.response.len() + file_len;
        } else {
            self.file = None;
            self.iov_count = 1;
            self.bytes_to_send = self.response.len();
        }
        Ok(())
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}
