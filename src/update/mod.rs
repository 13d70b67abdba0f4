//! The update daemon's internals (`spec.md` §4.4): coordination channel,
//! apply lock, git plumbing, rollback snapshots, and the phase state
//! machine with its critical-section signal discipline.

mod channel;
mod git;
mod lock;
mod snapshot;
mod state_machine;

pub use channel::{UpdateAction, UpdateChannel, UpdateRequest, UpdateResult, UpdateStatus};
pub use git::{commits_behind, current_commit, CommitsBehind, GitError};
pub use lock::ApplyLock;
pub use snapshot::{SnapshotError, SnapshotStore};
pub use state_machine::{DaemonSignalState, UpdateContext, UpdateError};
