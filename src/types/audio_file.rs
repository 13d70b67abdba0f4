//! The `AudioFile` entity (`spec.md` §3). Owned 1:1 by at most one
//! `Detection`; deletion cascades from the owning detection.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFile {
    pub id: Uuid,
    pub file_path: String,
    pub duration_seconds: f64,
    pub size_bytes: u64,
}

impl AudioFile {
    pub fn new(file_path: impl Into<String>, duration_seconds: f64, size_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: file_path.into(),
            duration_seconds,
            size_bytes,
        }
    }
}
