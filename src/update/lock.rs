//! The update daemon's apply lock (`spec.md` §4.4 "Lock discipline").
//!
//! Guards the apply path: only one apply may be in progress per host.
//! Stale-lock detection reclaims the lock if the recorded PID no longer
//! maps to a running process.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A filesystem-backed advisory lock held for the duration of an apply.
#[derive(Debug)]
pub struct ApplyLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ApplyLock {
    const LOCK_FILE_NAME: &'static str = "update.lock";

    /// Acquires the apply lock under `data_dir`, reclaiming it if the PID
    /// it names is no longer alive.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();

        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory: {data_dir:?}"))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::check_existing_lock(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "another update apply is already in progress (PID: {pid}); \
                         if no such process is running, remove the stale lock at {lock_path:?}"
                    );
                }
                Ok(None) => {
                    tracing::info!(path = ?lock_path, "reclaiming stale update lock");
                    fs::remove_file(&lock_path).context("failed to remove stale update lock")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "error checking existing update lock, removing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file = File::create(&lock_path)
            .with_context(|| format!("failed to create update lock: {lock_path:?}"))?;
        writeln!(file, "{pid}").context("failed to write PID to update lock")?;

        tracing::debug!(pid, path = ?lock_path, "acquired update apply lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    fn check_existing_lock(lock_path: &Path) -> Result<Option<u32>> {
        let mut file = File::open(lock_path).context("failed to open existing update lock")?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("failed to read update lock contents")?;

        let pid: u32 = contents
            .trim()
            .parse()
            .context("failed to parse PID from update lock")?;

        if Self::is_process_running(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("corvid-update"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "failed to remove update lock");
            } else {
                tracing::debug!(path = ?self.lock_path, "released update apply lock");
            }
            self.owned = false;
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ApplyLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_creates_lock_with_our_pid() {
        let temp_dir = tempdir().unwrap();
        let lock = ApplyLock::acquire(temp_dir.path()).unwrap();

        assert!(lock.path().exists());
        let contents = fs::read_to_string(lock.path()).unwrap();
        let pid: u32 = contents.trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let temp_dir = tempdir().unwrap();
        let lock_path;
        {
            let lock = ApplyLock::acquire(temp_dir.path()).unwrap();
            lock_path = lock.path().to_path_buf();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn stale_lock_with_dead_pid_is_reclaimed() {
        let temp_dir = tempdir().unwrap();
        let lock_path = temp_dir.path().join(ApplyLock::LOCK_FILE_NAME);
        fs::write(&lock_path, "999999999\n").unwrap();

        let lock = ApplyLock::acquire(temp_dir.path()).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        let pid: u32 = contents.trim().parse().unwrap();
        assert_eq!(pid, std::process::id());
    }
}
