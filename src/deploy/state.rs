// ABOUTME: Rollout state derived from the lock file.
// ABOUTME: Each state lists the actions that may follow it.

use std::fmt;

use serde::Serialize;

use super::lock::{LockRecord, RolloutPhase};

/// Where a deployment root is in its rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutState {
    /// No lock. Available actions: `start`, `hotfix`, `revert`, `release`, `tag`.
    Unlocked,
    /// Lock held, tree updated. Available actions: `sync`, `manual-sync`, `release`, `abort`.
    Started,
    /// Tag cut, waiting for code to reach production. Available actions: `finish`, `abort`.
    SyncPending,
    /// Sync hook failed. Available actions: `finish`, `abort`.
    SyncFailed,
    /// Sync hook succeeded but the rollout has not been closed.
    Synced,
}

impl RolloutState {
    pub fn from_lock(lock: Option<&LockRecord>) -> Self {
        match lock.map(|l| l.phase) {
            None => RolloutState::Unlocked,
            Some(RolloutPhase::Started) => RolloutState::Started,
            Some(RolloutPhase::SyncPending) => RolloutState::SyncPending,
            Some(RolloutPhase::SyncFailed) => RolloutState::SyncFailed,
            Some(RolloutPhase::Synced) => RolloutState::Synced,
        }
    }

    /// States from which `finish` may close the rollout.
    pub fn can_finish(self) -> bool {
        matches!(
            self,
            RolloutState::SyncPending | RolloutState::SyncFailed | RolloutState::Synced
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RolloutState::Unlocked => "unlocked",
            RolloutState::Started => "started",
            RolloutState::SyncPending => "sync-pending",
            RolloutState::SyncFailed => "sync-failed",
            RolloutState::Synced => "synced",
        }
    }
}

impl fmt::Display for RolloutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::lock::Holder;
    use crate::types::{CommitId, EnvName};

    #[test]
    fn derives_from_lock_phase() {
        assert_eq!(RolloutState::from_lock(None), RolloutState::Unlocked);

        let mut lock = LockRecord::new(
            Holder::current(),
            "start",
            EnvName::new("sheep").unwrap(),
            CommitId::new("abc"),
        );
        assert_eq!(RolloutState::from_lock(Some(&lock)), RolloutState::Started);
        lock.phase = RolloutPhase::SyncFailed;
        assert_eq!(RolloutState::from_lock(Some(&lock)), RolloutState::SyncFailed);
    }

    #[test]
    fn finish_allowed_only_after_tagging() {
        assert!(!RolloutState::Unlocked.can_finish());
        assert!(!RolloutState::Started.can_finish());
        assert!(RolloutState::SyncPending.can_finish());
        assert!(RolloutState::SyncFailed.can_finish());
        assert!(RolloutState::Synced.can_finish());
    }
}
