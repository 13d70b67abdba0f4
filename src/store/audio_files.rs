//! `audio_files` table access (`spec.md` §3 `AudioFile`).

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::AudioFile;

use super::StoreError;

pub struct AudioFileStore<'a> {
    pool: &'a SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AudioFileRow {
    id: String,
    file_path: String,
    duration_seconds: f64,
    size_bytes: i64,
}

impl AudioFileStore<'_> {
    pub fn new(pool: &SqlitePool) -> AudioFileStore<'_> {
        AudioFileStore { pool }
    }

    pub async fn insert(&self, audio: &AudioFile) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO audio_files (id, file_path, duration_seconds, size_bytes) VALUES (?, ?, ?, ?)",
        )
        .bind(audio.id.to_string())
        .bind(&audio.file_path)
        .bind(audio.duration_seconds)
        .bind(audio.size_bytes as i64)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AudioFile>, StoreError> {
        let row: Option<AudioFileRow> = sqlx::query_as(
            "SELECT id, file_path, duration_seconds, size_bytes FROM audio_files WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| {
            Ok(AudioFile {
                id: Uuid::parse_str(&r.id).map_err(|e| StoreError::InvalidDetection(e.to_string()))?,
                file_path: r.file_path,
                duration_seconds: r.duration_seconds,
                size_bytes: r.size_bytes as u64,
            })
        })
        .transpose()
    }

    /// Deletes an audio file row; `ON DELETE CASCADE` on `detections`
    /// handles the owning detection automatically. The inverse (deleting
    /// an owning detection first) is the normal admin-delete path instead.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM audio_files WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
