//! The inter-process FIFO transport (`spec.md` §2 "Inter-Process
//! Transport", §4.1). Named pipes decouple the capture daemon from the
//! analysis daemon and the live-stream reader, with natural backpressure
//! from the kernel pipe buffer.

use std::ffi::CString;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create FIFO directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fifo path {0} contains a NUL byte")]
    InvalidPath(PathBuf),
    #[error("mkfifo({path}) failed: {source}")]
    Mkfifo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("open({path}) failed: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The two named pipes the capture daemon writes every frame to, in the
/// order `spec.md` §4.1 requires: analysis first, then livestream.
pub struct FifoPair {
    pub analysis_path: PathBuf,
    pub livestream_path: PathBuf,
}

impl FifoPair {
    pub fn new(fifo_dir: impl AsRef<Path>) -> Self {
        let dir = fifo_dir.as_ref();
        Self {
            analysis_path: dir.join("analysis.fifo"),
            livestream_path: dir.join("livestream.fifo"),
        }
    }

    /// Ensures the FIFO directory exists and both named pipes exist,
    /// creating them with `mkfifo(2)` if missing. Idempotent: an
    /// already-existing FIFO is left untouched.
    pub fn ensure_created(&self) -> Result<(), TransportError> {
        let dir = self
            .analysis_path
            .parent()
            .expect("fifo path always has a parent");
        std::fs::create_dir_all(dir).map_err(|source| TransportError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        create_fifo_if_missing(&self.analysis_path)?;
        create_fifo_if_missing(&self.livestream_path)?;
        Ok(())
    }
}

fn create_fifo_if_missing(path: &Path) -> Result<(), TransportError> {
    if path.exists() {
        return Ok(());
    }

    let c_path =
        CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| TransportError::InvalidPath(path.to_path_buf()))?;

    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of
    // the call and mkfifo does not retain it afterward.
    let result = unsafe { libc::mkfifo(c_path.as_ptr(), 0o660) };
    if result != 0 {
        return Err(TransportError::Mkfifo {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Opens `path` for blocking writes. Blocking open on a FIFO waits for a
/// reader to be present, matching the "open both for writing with blocking
/// semantics" contract in `spec.md` §4.1.
pub fn open_for_writing(path: &Path) -> Result<std::fs::File, TransportError> {
    std::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Opens `path` for blocking reads.
pub fn open_for_reading(path: &Path) -> Result<std::fs::File, TransportError> {
    std::fs::OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Wraps a raw writable FIFO descriptor so it can be closed explicitly at
/// shutdown without relying on drop order, matching the "exit-time hook
/// ... closes the descriptors" contract.
pub fn owned_fd_from_file(file: std::fs::File) -> OwnedFd {
    let fd = file.as_raw_fd();
    std::mem::forget(file);
    // SAFETY: `fd` was just extracted from a File we forgot rather than
    // dropped, so it is still open and uniquely owned by the caller now.
    unsafe { OwnedFd::from_raw_fd(fd) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_created_is_idempotent() {
        let dir = tempdir().unwrap();
        let pair = FifoPair::new(dir.path());

        pair.ensure_created().unwrap();
        assert!(pair.analysis_path.exists());
        assert!(pair.livestream_path.exists());

        // Second call must not error even though both FIFOs already exist.
        pair.ensure_created().unwrap();
    }
}
