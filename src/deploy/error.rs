// ABOUTME: Error types for rollout actions.
// ABOUTME: Every fatal error names what failed and how the operator gets out of it.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::lock::Holder;
use super::record::RecordError;
use super::state::RolloutState;
use crate::hooks::HookError;
use crate::tags::TagError;
use crate::types::TagName;
use crate::vcs::VcsError;

/// Information about who holds the deploy lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolderInfo {
    pub holder: Holder,
    pub acquired_at: DateTime<Utc>,
    pub action: String,
}

impl fmt::Display for LockHolderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} since {} (action: {})",
            self.holder,
            self.acquired_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.action
        )
    }
}

/// Errors that can occur while running a rollout action.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// Another operator holds the lock.
    #[error("rollout is locked by {0}; use `rollout abort --force` to discard their rollout")]
    AlreadyLocked(Box<LockHolderInfo>),

    /// The action needs a rollout in progress.
    #[error("no rollout in progress (run `rollout start` first)")]
    NotLocked,

    /// The lock file exists but cannot be understood.
    #[error("lock file {} is unreadable ({reason}); inspect it, then run `rollout abort --force`", .path.display())]
    LockCorrupt { path: PathBuf, reason: String },

    /// Tracked files differ from HEAD.
    #[error("working tree has uncommitted changes (commit or stash them, or pass --no-check-clean):\n{status}")]
    DirtyWorkingTree { status: String },

    /// Block file present or umask not compliant.
    #[error("blocked by policy: {0}")]
    BlockedByPolicy(String),

    /// The environment may not cut tags on its own.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The action does not apply to the current rollout state.
    #[error("cannot {action} while the rollout is {state}: {hint}")]
    InvalidState {
        action: &'static str,
        state: RolloutState,
        hint: &'static str,
    },

    /// A hook failed; `hint` says whether the lock is still held.
    #[error("{source}; {hint}")]
    Hook { source: HookError, hint: String },

    /// The sync hook exited nonzero after the tag was cut.
    #[error(
        "sync hook {} failed with {}; tag {tag} was created and the lock is still held. \
         Fix the problem, re-run {} manually, then run `rollout finish` \
         (or `rollout abort` to give up)",
        .script.display(),
        exit_label(.exit_code),
        .script.display()
    )]
    SyncFailed {
        script: PathBuf,
        exit_code: Option<i32>,
        tag: TagName,
    },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployErrorKind {
    AlreadyLocked,
    NotLocked,
    LockCorrupt,
    DirtyWorkingTree,
    BlockedByPolicy,
    PermissionDenied,
    InvalidState,
    HookFailed,
    HookNotExecutable,
    SyncHookMissing,
    SyncFailed,
    MalformedDeployRecord,
    DeployRecordNotFound,
    NoMatchingTag,
    /// Every suffix for the current minute is taken.
    TagNameCollision,
    InvalidDateFormat,
    Vcs,
    Io,
}

impl DeployError {
    pub(crate) fn already_locked(info: LockHolderInfo) -> Self {
        DeployError::AlreadyLocked(Box::new(info))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn hook(source: HookError, hint: impl Into<String>) -> Self {
        DeployError::Hook {
            source,
            hint: hint.into(),
        }
    }

    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> DeployErrorKind {
        match self {
            DeployError::AlreadyLocked(_) => DeployErrorKind::AlreadyLocked,
            DeployError::NotLocked => DeployErrorKind::NotLocked,
            DeployError::LockCorrupt { .. } => DeployErrorKind::LockCorrupt,
            DeployError::DirtyWorkingTree { .. } => DeployErrorKind::DirtyWorkingTree,
            DeployError::BlockedByPolicy(_) => DeployErrorKind::BlockedByPolicy,
            DeployError::PermissionDenied(_) => DeployErrorKind::PermissionDenied,
            DeployError::InvalidState { .. } => DeployErrorKind::InvalidState,
            DeployError::Hook { source, .. } => match source {
                HookError::Failed { .. } | HookError::Spawn { .. } => DeployErrorKind::HookFailed,
                HookError::NotExecutable { .. } => DeployErrorKind::HookNotExecutable,
                HookError::SyncHookMissing { .. } => DeployErrorKind::SyncHookMissing,
                HookError::Discovery { .. } => DeployErrorKind::Io,
            },
            DeployError::SyncFailed { .. } => DeployErrorKind::SyncFailed,
            DeployError::Record(RecordError::NotFound(_)) => DeployErrorKind::DeployRecordNotFound,
            DeployError::Record(RecordError::Malformed { .. }) => {
                DeployErrorKind::MalformedDeployRecord
            }
            DeployError::Record(RecordError::Io { .. }) => DeployErrorKind::Io,
            DeployError::Tag(TagError::NoMatchingTag { .. }) => DeployErrorKind::NoMatchingTag,
            DeployError::Tag(TagError::InvalidDateFormat { .. }) => {
                DeployErrorKind::InvalidDateFormat
            }
            DeployError::Tag(TagError::NameCollision(_)) => DeployErrorKind::TagNameCollision,
            DeployError::Tag(TagError::Vcs(_)) | DeployError::Vcs(_) => DeployErrorKind::Vcs,
            DeployError::Io { .. } => DeployErrorKind::Io,
        }
    }

    /// Holder of the lock, when the error is lock contention.
    pub fn lock_holder_info(&self) -> Option<&LockHolderInfo> {
        match self {
            DeployError::AlreadyLocked(info) => Some(info),
            _ => None,
        }
    }
}
