//! The persistent store (`spec.md` §3, §5 "Shared-resource discipline").
//!
//! A single SQLite file accessed under a per-process connection pool in
//! WAL mode; writers serialise at the DB level. The capture daemon never
//! opens a pool at all; the analysis daemon is the sole writer of
//! `detections`/`audio_files`; the web daemon is the sole writer of
//! `weather` attachments.

mod audio_files;
mod detections;
mod reference;
mod weather;

pub use audio_files::AudioFileStore;
pub use detections::{DetectionFilter, DetectionPage, DetectionStore};
pub use reference::ReferenceStore;
pub use weather::WeatherStore;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("detection violates invariant: {0}")]
    InvalidDetection(String),
}

/// Opens the SQLite pool at `db_path`, enabling WAL mode and foreign keys,
/// creating the file if it does not already exist.
pub async fn open_pool(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    sqlx::migrate!("src/store/migrations").run(&pool).await?;

    Ok(pool)
}

/// Runs pending migrations against `db_path` without holding a long-lived
/// pool open; used by the update daemon's `RUNNING_MIGRATIONS` phase and
/// the `corvid-update --mode migrate` one-shot path.
pub async fn run_migrations(db_path: &Path) -> Result<(), StoreError> {
    let pool = open_pool(db_path).await?;
    pool.close().await;
    Ok(())
}
