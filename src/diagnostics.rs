// ABOUTME: Diagnostics accumulator for non-fatal warnings during a rollout.
// ABOUTME: Collects warnings that shouldn't fail an action but should be shown to operators.

use serde::Serialize;

use crate::hooks::{HookError, HookFailure, HookPhase};

/// Collects non-fatal warnings during rollout actions.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Take the collected warnings, leaving the accumulator empty.
    pub fn take(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// A non-fatal warning collected during a rollout.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A hook failed on a path where failures do not stop the action.
    pub fn hook_failed(failure: &HookFailure) -> Self {
        Self {
            kind: WarningKind::HookFailed,
            message: failure.to_string(),
        }
    }

    /// The hooks of a phase could not be listed, so none of them ran.
    pub fn hooks_unavailable(phase: HookPhase, err: &HookError) -> Self {
        Self {
            kind: WarningKind::HooksUnavailable,
            message: format!("{phase} hooks could not run: {err}"),
        }
    }

    pub fn notification_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NotificationFailed,
            message: message.into(),
        }
    }

    pub fn stale_lock(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StaleLock,
            message: message.into(),
        }
    }

    pub fn lock_overridden(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockOverridden,
            message: message.into(),
        }
    }

    pub fn malformed_record(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MalformedRecord,
            message: message.into(),
        }
    }

    pub fn non_executable_hook(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NonExecutableHook,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A `post-reset` or `post-tree-update` hook failed while restoring the tree.
    HookFailed,
    /// A hook directory could not be read while restoring the tree.
    HooksUnavailable,
    /// The announcement command failed; the rollout itself completed.
    NotificationFailed,
    /// The lock is older than `stale_lock_after`.
    StaleLock,
    /// `--force` discarded someone else's lock.
    LockOverridden,
    /// The deploy record could not be parsed.
    MalformedRecord,
    /// A hook file matched but was not executable and was skipped.
    NonExecutableHook,
}
