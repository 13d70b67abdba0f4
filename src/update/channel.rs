//! The update coordination channel (`spec.md` §4.4).
//!
//! The web daemon and the update daemon are separate OS processes that
//! "neither imports the other"; the spec's in-memory key-value store is
//! realized here as three small JSON documents under the data directory,
//! each written atomically (write to a temp file, then rename) so a
//! reader never observes a half-written document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to read channel document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write channel document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize channel document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateAction {
    Check,
    Apply,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateRequest {
    pub action: UpdateAction,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateStatus {
    pub current_version: String,
    pub latest_version: Option<String>,
    pub available: bool,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateResult {
    pub success: bool,
    pub version: String,
    pub error: Option<String>,
}

/// Handle onto the three coordination documents living under
/// `<data_dir>/update_channel/`.
pub struct UpdateChannel {
    dir: PathBuf,
}

impl UpdateChannel {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("update_channel"),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ChannelError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| ChannelError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));
        let body = serde_json::to_vec_pretty(value)?;

        std::fs::write(&tmp_path, body).map_err(|source| ChannelError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| ChannelError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(())
    }

    fn read<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>, ChannelError> {
        let path = self.path(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ChannelError::Read { path, source }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), ChannelError> {
        let path = self.path(key);
        match std::fs::remove_file(&path) {
            Ok(()) | Err(_) if !path.exists() => Ok(()),
            Err(source) => Err(ChannelError::Write { path, source }),
        }
    }

    /// Written by the web daemon; consumed (read, then deleted) by the
    /// update daemon's poll loop.
    pub fn write_request(&self, request: &UpdateRequest) -> Result<(), ChannelError> {
        self.write("request", request)
    }

    pub fn take_request(&self) -> Result<Option<UpdateRequest>, ChannelError> {
        let request = self.read("request")?;
        if request.is_some() {
            self.delete("request")?;
        }
        Ok(request)
    }

    pub fn write_status(&self, status: &UpdateStatus) -> Result<(), ChannelError> {
        self.write("status", status)
    }

    pub fn read_status(&self) -> Result<Option<UpdateStatus>, ChannelError> {
        self.read("status")
    }

    pub fn write_result(&self, result: &UpdateResult) -> Result<(), ChannelError> {
        self.write("result", result)
    }

    pub fn read_result(&self) -> Result<Option<UpdateResult>, ChannelError> {
        self.read("result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn request_is_consumed_exactly_once() {
        let dir = tempdir().unwrap();
        let channel = UpdateChannel::new(dir.path());

        channel
            .write_request(&UpdateRequest {
                action: UpdateAction::Check,
                version: None,
            })
            .unwrap();

        let first = channel.take_request().unwrap();
        assert!(first.is_some());

        let second = channel.take_request().unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn status_round_trips() {
        let dir = tempdir().unwrap();
        let channel = UpdateChannel::new(dir.path());

        let status = UpdateStatus {
            current_version: "v1.2.0".to_string(),
            latest_version: Some("v1.3.0".to_string()),
            available: true,
            checked_at: Utc::now(),
        };
        channel.write_status(&status).unwrap();

        assert_eq!(channel.read_status().unwrap(), Some(status));
    }
}
