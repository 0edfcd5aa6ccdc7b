//! Request target → mapped file.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::mapped::MappedFile;

/// World-read permission bit (`S_IROTH`).
const WORLD_READABLE: u32 = 0o004;

/// Directory that request targets are resolved against.
///
/// The candidate path is the root's bytes followed by the target's
/// bytes, with no normalization. `..` segments are passed through to
/// the filesystem, so this is not safe against directory traversal;
/// serve only trees where every world-readable file may be exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRoot {
    root: PathBuf,
    max_path_len: usize,
}

impl DocumentRoot {
    pub fn new(root: impl Into<PathBuf>, max_path_len: usize) -> Self {
        Self {
            root: root.into(),
            max_path_len,
        }
    }

    /// Concatenate root and target.
    pub fn candidate(&self, url: &[u8]) -> Result<PathBuf, ResolveError> {
        let root = self.root.as_os_str().as_bytes();
        if root.len() + url.len() > self.max_path_len {
            return Err(ResolveError::PathTooLong(self.max_path_len));
        }
        let mut bytes = Vec::with_capacity(root.len() + url.len());
        bytes.extend_from_slice(root);
        bytes.extend_from_slice(url);
        Ok(PathBuf::from(OsString::from_vec(bytes)))
    }

    /// Stat, check and map the file named by `url`.
    pub fn open(&self, url: &[u8]) -> Result<MappedFile, ResolveError> {
        let path = self.candidate(url)?;

        let meta = fs::metadata(&path).map_err(|e| {
            debug!(path = %path.display(), error = %e, "stat failed");
            ResolveError::NotFound
        })?;
        if meta.permissions().mode() & WORLD_READABLE == 0 {
            return Err(ResolveError::Forbidden);
        }
        if meta.is_dir() {
            return Err(ResolveError::Directory);
        }

        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ResolveError::Forbidden,
            _ => {
                warn!(path = %path.display(), error = %e, "open failed");
                ResolveError::Internal
            }
        })?;
        let len = usize::try_from(meta.len()).map_err(|_| ResolveError::Internal)?;
        MappedFile::map(&file, len).map_err(|e| {
            warn!(path = %path.display(), len, error = %e, "mmap failed");
            ResolveError::Internal
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Scratch(PathBuf);

    impl Scratch {
        fn new(name: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "httpd-resolve-{}-{}",
                std::process::id(),
                name
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
            Scratch(dir)
        }

        fn file(&self, name: &str, contents: &[u8], mode: u32) {
            let path = self.0.join(name);
            File::create(&path).unwrap().write_all(contents).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        }

        fn root(&self) -> DocumentRoot {
            DocumentRoot::new(&self.0, 200)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_readable_file_maps() {
        let s = Scratch::new("ok");
        s.file("index.html", b"<h1>hi</h1>", 0o644);
        let mapped = s.root().open(b"/index.html").unwrap();
        assert_eq!(mapped.as_slice(), b"<h1>hi</h1>");
    }

    #[test]
    fn test_missing_is_not_found() {
        let s = Scratch::new("missing");
        assert_eq!(s.root().open(b"/nope.html").unwrap_err(), ResolveError::NotFound);
    }

    #[test]
    fn test_not_world_readable_is_forbidden() {
        let s = Scratch::new("forbidden");
        s.file("secret.html", b"x", 0o600);
        assert_eq!(s.root().open(b"/secret.html").unwrap_err(), ResolveError::Forbidden);
    }

    #[test]
    fn test_directory_is_rejected() {
        let s = Scratch::new("dir");
        fs::create_dir(s.0.join("sub")).unwrap();
        fs::set_permissions(s.0.join("sub"), fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(s.root().open(b"/sub").unwrap_err(), ResolveError::Directory);
        assert_eq!(s.root().open(b"/").unwrap_err(), ResolveError::Directory);
    }

    #[test]
    fn test_empty_file() {
        let s = Scratch::new("empty");
        s.file("empty.html", b"", 0o644);
        assert!(s.root().open(b"/empty.html").unwrap().is_empty());
    }

    #[test]
    fn test_path_too_long() {
        let root = DocumentRoot::new("/srv/www", 20);
        assert_eq!(
            root.candidate(b"/a-rather-long-name.html").unwrap_err(),
            ResolveError::PathTooLong(20)
        );
        assert_eq!(root.candidate(b"/a.html").unwrap(), PathBuf::from("/srv/www/a.html"));
    }
}
