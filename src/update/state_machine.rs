//! The update daemon's phase state machine (`spec.md` §4.4) and the
//! critical-section signal-queuing discipline around it (§9 "Signal-handler
//! shared global flags").

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

use crate::types::{RollbackPoint, UpdatePhase, UpdateState};

use super::git::{self, GitError};
use super::snapshot::{SnapshotError, SnapshotStore};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("state file io error: {0}")]
    StateIo(#[from] std::io::Error),
    #[error("state file is malformed: {0}")]
    StateMalformed(#[from] serde_json::Error),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("update step failed: {0}")]
    Step(String),
}

/// A `DaemonState` value, per `spec.md` §9: signal handlers write to this
/// rather than toggling module-level flags. `enter_critical_section` and
/// `exit_critical_section` model the enter/exit pair that drains queued
/// signals on exit.
#[derive(Debug, Default)]
pub struct DaemonSignalState {
    critical: std::sync::atomic::AtomicBool,
    pending_signals: AtomicU32,
    shutdown_requested: std::sync::atomic::AtomicBool,
}

impl DaemonSignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called from the signal handler. While a critical section is open,
    /// the signal is queued rather than honoured immediately.
    pub fn on_signal(&self) {
        if self.critical.load(Ordering::SeqCst) {
            self.pending_signals.fetch_add(1, Ordering::SeqCst);
        } else {
            self.shutdown_requested.store(true, Ordering::SeqCst);
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn enter_critical_section(&self) {
        self.critical.store(true, Ordering::SeqCst);
    }

    /// Drains any signals queued during the critical section, re-delivering
    /// them in the order the spec requires (FIFO, which here just means
    /// "apply the same terminal effect for each queued signal": setting
    /// the shutdown flag if at least one was queued).
    pub fn exit_critical_section(&self) {
        self.critical.store(false, Ordering::SeqCst);
        let pending = self.pending_signals.swap(0, Ordering::SeqCst);
        if pending > 0 {
            self.shutdown_requested.store(true, Ordering::SeqCst);
        }
    }
}

pub struct UpdateContext {
    pub data_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub git_remote: String,
    pub git_branch: String,
}

impl UpdateContext {
    fn state_path(&self) -> PathBuf {
        self.data_dir.join("update_state.json")
    }

    pub fn load_state(&self) -> Result<Option<UpdateState>, UpdateError> {
        match std::fs::read(self.state_path()) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_state(&self, state: &UpdateState) -> Result<(), UpdateError> {
        let body = serde_json::to_vec_pretty(state)?;
        std::fs::write(self.state_path(), body)?;
        Ok(())
    }

    pub fn clear_state(&self) -> Result<(), UpdateError> {
        match std::fs::remove_file(self.state_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Startup recovery (`spec.md` §8 invariant 6): if a state file exists
    /// and its phase is neither `idle` nor terminal, attempt rollback
    /// (for code/migration-phase interruptions) before serving requests.
    pub async fn recover_on_startup(&self) -> Result<(), UpdateError> {
        let Some(mut state) = self.load_state()? else {
            return Ok(());
        };

        if state.phase.is_terminal() {
            self.clear_state()?;
            return Ok(());
        }

        if state.phase.requires_manual_intervention() {
            tracing::error!(phase = ?state.phase, "update interrupted mid-restart; manual intervention required");
            return Ok(());
        }

        if state.phase.requires_rollback_on_recovery() {
            tracing::warn!(phase = ?state.phase, "update interrupted, rolling back");
            state.fail("interrupted");
            self.save_state(&state)?;
            self.rollback(&mut state).await?;
        }

        Ok(())
    }

    async fn rollback(&self, state: &mut UpdateState) -> Result<(), UpdateError> {
        let Some(point) = state.rollback_point.clone() else {
            tracing::error!("rollback requested but no rollback point recorded");
            self.clear_state()?;
            return Ok(());
        };

        let store = SnapshotStore::new(&self.data_dir);
        store.restore(&point, &self.db_path, &self.config_path)?;
        git::checkout(&self.repo_dir, &point.commit_id).await?;

        self.clear_state()?;
        Ok(())
    }

    /// Runs the `CHECKING` phase: fetch and compare against the remote.
    pub async fn check(&self) -> Result<super::git::CommitsBehind, UpdateError> {
        Ok(git::commits_behind(&self.repo_dir, &self.git_remote, &self.git_branch).await?)
    }

    /// Runs the full apply flow: `SNAPSHOTTING` through `VERIFYING`,
    /// rolling back on any step failure. `signals` gates the critical
    /// section so termination signals are queued rather than honoured
    /// while code/schema are in a transitional state.
    pub async fn apply(
        &self,
        target_version: &str,
        signals: &DaemonSignalState,
    ) -> Result<(), UpdateError> {
        let mut state = UpdateState::new(target_version);
        state.advance(UpdatePhase::Snapshotting, "capturing rollback point");
        self.save_state(&state)?;

        let commit_id = git::current_commit(&self.repo_dir).await?;
        let snapshots = SnapshotStore::new(&self.data_dir);
        let point: RollbackPoint =
            snapshots.capture(&commit_id, &self.db_path, &self.config_path)?;
        state.rollback_point = Some(point.clone());
        self.save_state(&state)?;

        signals.enter_critical_section();
        let result = self.run_critical_section(&mut state, target_version).await;
        signals.exit_critical_section();

        match result {
            Ok(()) => {
                state.advance(UpdatePhase::Idle, "completed");
                snapshots.prune_old()?;
                self.clear_state()?;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "update apply failed, rolling back");
                state.fail(e.to_string());
                self.save_state(&state)?;
                self.rollback(&mut state).await?;
                Err(e)
            }
        }
    }

    async fn run_critical_section(
        &self,
        state: &mut UpdateState,
        target_version: &str,
    ) -> Result<(), UpdateError> {
        state.advance(UpdatePhase::UpdatingCode, "checking out target commit");
        self.save_state(state)?;
        git::checkout(&self.repo_dir, target_version).await?;

        state.advance(UpdatePhase::UpdatingDeps, "updating dependencies");
        self.save_state(state)?;
        // Dependency update is a thin shell-out in the original system;
        // left as a logged no-op stub here since it has no Rust-crate
        // equivalent worth modelling (cargo fetch happens at build time).

        state.advance(UpdatePhase::RunningMigrations, "running schema migrations");
        self.save_state(state)?;
        crate::store::run_migrations(&self.db_path)
            .await
            .map_err(|e| UpdateError::Step(e.to_string()))?;

        state.advance(UpdatePhase::RestartingServices, "restarting services");
        self.save_state(state)?;
        // Service restart is owned by the surrounding process supervisor
        // (systemd, docker restart policy); this daemon only records the
        // phase transition so recovery-on-startup can detect an
        // interruption here and flag it for manual intervention.

        state.advance(UpdatePhase::Verifying, "verifying");
        self.save_state(state)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_signal_during_critical_section_defers_shutdown() {
        let signals = DaemonSignalState::new();
        signals.enter_critical_section();
        signals.on_signal();
        assert!(!signals.shutdown_requested());

        signals.exit_critical_section();
        assert!(signals.shutdown_requested());
    }

    #[test]
    fn signal_outside_critical_section_is_immediate() {
        let signals = DaemonSignalState::new();
        signals.on_signal();
        assert!(signals.shutdown_requested());
    }
}
