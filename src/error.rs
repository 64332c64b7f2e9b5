// ABOUTME: Application-wide error types for rollout.
// ABOUTME: Uses thiserror for ergonomic error handling.

use thiserror::Error;

use crate::deploy::{DeployError, DeployErrorKind};
use crate::notify::NotifyError;
use crate::types::EnvNameError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no environment given: pass one on the command line or set `environment` in rollout.yml")]
    NoEnvironment,

    #[error("invalid environment name: {0}")]
    InvalidEnvironment(#[from] EnvNameError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no revert target selected (pass --to <TAG> when not on a terminal)")]
    NoSelection,

    #[error("prompt failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit status for this error.
    ///
    /// Lock contention and state errors get their own codes so wrappers can
    /// tell "someone else is deploying" from "something broke".
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Deploy(e) => match e.kind() {
                DeployErrorKind::AlreadyLocked => 3,
                DeployErrorKind::SyncFailed => 4,
                DeployErrorKind::NotLocked | DeployErrorKind::InvalidState => 5,
                DeployErrorKind::DirtyWorkingTree
                | DeployErrorKind::BlockedByPolicy
                | DeployErrorKind::PermissionDenied => 6,
                _ => 1,
            },
            Error::NoEnvironment | Error::InvalidEnvironment(_) | Error::InvalidConfig(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_has_its_own_exit_code() {
        let err = Error::from(DeployError::NotLocked);
        assert_eq!(err.exit_code(), 5);
        assert_eq!(Error::NoEnvironment.exit_code(), 2);
    }
}
