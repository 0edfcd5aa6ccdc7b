//! Read-only private file mappings.
//!
//! A [`MappedFile`] is the body source of a 200 response. It is owned
//! by the connection for the lifetime of one response and unmapped on
//! drop. The file is assumed not to shrink while it is mapped; reading
//! past a truncated end raises `SIGBUS`.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::{self, NonNull};

pub struct MappedFile {
    /// `None` for zero-length files, which `mmap` refuses.
    ptr: Option<NonNull<u8>>,
    len: usize,
}

// SAFETY: the mapping is read-only and exclusively owned; no interior
// mutability is exposed.
unsafe impl Send for MappedFile {}
unsafe impl Sync for MappedFile {}

impl MappedFile {
    /// Map the first `len` bytes of `file` (`PROT_READ`, `MAP_PRIVATE`).
    pub fn map(file: &File, len: usize) -> io::Result<Self> {
        if len == 0 {
            return Ok(Self { ptr: None, len: 0 });
        }
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            ptr: NonNull::new(addr as *mut u8),
            len,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self.ptr {
            // SAFETY: ptr..ptr+len is a live PROT_READ mapping until drop.
            Some(p) => unsafe { std::slice::from_raw_parts(p.as_ptr(), self.len) },
            None => &[],
        }
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Some(p) = self.ptr.take() {
            let ret = unsafe { libc::munmap(p.as_ptr() as *mut libc::c_void, self.len) };
            if ret != 0 {
                tracing::error!(
                    len = self.len,
                    error = %io::Error::last_os_error(),
                    "munmap failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("mapped", &self.ptr.is_some())
            .field("len", &self.len)
            .finish()
    }
}
