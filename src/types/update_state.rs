//! The on-disk `update_state.json` document (`spec.md` §3, §4.4).
//!
//! Never cached in memory across processes: every reader reloads it from
//! disk, and it is deleted on successful completion of an update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Idle,
    Checking,
    ReadyToApply,
    Snapshotting,
    UpdatingCode,
    UpdatingDeps,
    RunningMigrations,
    RestartingServices,
    Verifying,
    RollingBack,
}

impl UpdatePhase {
    /// Phases in which an unexpected process exit (SIGKILL, power loss)
    /// demands a rollback attempt at the next startup.
    pub fn requires_rollback_on_recovery(self) -> bool {
        matches!(self, UpdatePhase::UpdatingCode | UpdatePhase::RunningMigrations)
    }

    /// Phases in which recovery cannot safely be automated; flagged for
    /// manual intervention instead.
    pub fn requires_manual_intervention(self) -> bool {
        matches!(self, UpdatePhase::RestartingServices)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UpdatePhase::Idle)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RollbackPoint {
    pub commit_id: String,
    pub db_snapshot_path: String,
    pub config_snapshot_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateState {
    pub phase: UpdatePhase,
    pub target_version: String,
    pub started_at: DateTime<Utc>,
    pub current_step: String,
    pub error: Option<String>,
    pub rollback_point: Option<RollbackPoint>,
}

impl UpdateState {
    pub fn new(target_version: impl Into<String>) -> Self {
        Self {
            phase: UpdatePhase::Checking,
            target_version: target_version.into(),
            started_at: Utc::now(),
            current_step: "checking".to_string(),
            error: None,
            rollback_point: None,
        }
    }

    pub fn advance(&mut self, phase: UpdatePhase, step: impl Into<String>) {
        self.phase = phase;
        self.current_step = step.into();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.phase = UpdatePhase::RollingBack;
        self.error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_classification_matches_critical_section_phases() {
        assert!(UpdatePhase::UpdatingCode.requires_rollback_on_recovery());
        assert!(UpdatePhase::RunningMigrations.requires_rollback_on_recovery());
        assert!(!UpdatePhase::Checking.requires_rollback_on_recovery());
        assert!(UpdatePhase::RestartingServices.requires_manual_intervention());
    }
}
