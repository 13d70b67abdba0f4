//! Rollback-point snapshots (`spec.md` §3 "Update state", §4.4 "Snapshot").
//!
//! A snapshot captures everything needed to restore the previous working
//! state: the code commit, a compressed copy of the SQLite database, and
//! a copy of the configuration file. Snapshots live under a dedicated
//! rollback directory and are pruned on successful completion.

use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::types::RollbackPoint;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error during snapshot: {0}")]
    Io(#[from] std::io::Error),
}

pub struct SnapshotStore {
    rollback_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            rollback_dir: data_dir.as_ref().join("rollback"),
        }
    }

    /// Captures the current commit, DB file, and config file into a
    /// dedicated, timestamp-named directory under `rollback/`.
    pub fn capture(
        &self,
        commit_id: &str,
        db_path: &Path,
        config_path: &Path,
    ) -> Result<RollbackPoint, SnapshotError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let snapshot_dir = self.rollback_dir.join(&stamp);
        std::fs::create_dir_all(&snapshot_dir)?;

        let db_snapshot_path = snapshot_dir.join("database.db.zst");
        compress_file(db_path, &db_snapshot_path)?;

        let config_snapshot_path = snapshot_dir.join("config.yaml.zst");
        compress_file(config_path, &config_snapshot_path)?;

        Ok(RollbackPoint {
            commit_id: commit_id.to_string(),
            db_snapshot_path: db_snapshot_path.to_string_lossy().into_owned(),
            config_snapshot_path: config_snapshot_path.to_string_lossy().into_owned(),
        })
    }

    /// Restores the DB and config from `point` back onto `db_path` and
    /// `config_path`. Idempotent: running it twice in a row is safe,
    /// since it only ever overwrites the destination with the same bytes.
    pub fn restore(
        &self,
        point: &RollbackPoint,
        db_path: &Path,
        config_path: &Path,
    ) -> Result<(), SnapshotError> {
        decompress_file(Path::new(&point.db_snapshot_path), db_path)?;
        decompress_file(Path::new(&point.config_snapshot_path), config_path)?;
        Ok(())
    }

    /// Deletes every snapshot directory except the most recent, called
    /// after a successful update completes.
    pub fn prune_old(&self) -> Result<(), SnapshotError> {
        let Ok(entries) = std::fs::read_dir(&self.rollback_dir) else {
            return Ok(());
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        for stale in dirs.iter().rev().skip(1) {
            std::fs::remove_dir_all(stale)?;
        }
        Ok(())
    }
}

fn compress_file(src: &Path, dst: &Path) -> Result<(), SnapshotError> {
    let mut input = std::fs::File::open(src)?;
    let output = std::fs::File::create(dst)?;
    zstd::stream::copy_encode(&mut input, output, 3)?;
    Ok(())
}

fn decompress_file(src: &Path, dst: &Path) -> Result<(), SnapshotError> {
    let input = std::fs::File::open(src)?;
    let mut output = std::fs::File::create(dst)?;
    zstd::stream::copy_decode(input, &mut output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn capture_then_restore_round_trips_contents() {
        let data_dir = tempdir().unwrap();
        let db_path = data_dir.path().join("database.db");
        let config_path = data_dir.path().join("config.yaml");
        std::fs::write(&db_path, b"pretend sqlite bytes").unwrap();
        std::fs::write(&config_path, b"config_version: 2\n").unwrap();

        let store = SnapshotStore::new(data_dir.path());
        let point = store.capture("deadbeef", &db_path, &config_path).unwrap();

        let restored_db = data_dir.path().join("restored.db");
        let restored_config = data_dir.path().join("restored.yaml");
        store
            .restore(&point, &restored_db, &restored_config)
            .unwrap();

        assert_eq!(
            std::fs::read(&restored_db).unwrap(),
            std::fs::read(&db_path).unwrap()
        );
        assert_eq!(
            std::fs::read(&restored_config).unwrap(),
            std::fs::read(&config_path).unwrap()
        );
    }

    #[test]
    fn prune_keeps_only_the_newest_snapshot() {
        let data_dir = tempdir().unwrap();
        let db_path = data_dir.path().join("database.db");
        let config_path = data_dir.path().join("config.yaml");
        std::fs::write(&db_path, b"v1").unwrap();
        std::fs::write(&config_path, b"v1").unwrap();

        let store = SnapshotStore::new(data_dir.path());
        store.capture("commit1", &db_path, &config_path).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.capture("commit2", &db_path, &config_path).unwrap();

        store.prune_old().unwrap();

        let remaining: Vec<_> = std::fs::read_dir(&store.rollback_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(remaining.len(), 1);
    }
}
