// ABOUTME: VCS adapter error types with SNAFU pattern.
// ABOUTME: Carries the failing git invocation so operators can reproduce it.

use snafu::Snafu;

/// Failure of a version-control operation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VcsError {
    #[snafu(display("failed to run `git {args}`: {source}"))]
    Spawn {
        args: String,
        source: std::io::Error,
    },

    #[snafu(display("`git {args}` failed ({}): {}", exit_label(*code), stderr.trim()))]
    Command {
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    #[snafu(display("unexpected output from `git {args}`: {detail}"))]
    Parse { args: String, detail: String },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsErrorKind {
    /// git could not be started.
    Unavailable,
    /// git ran and reported failure.
    CommandFailed,
    /// git output could not be understood.
    Parse,
}

impl VcsError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> VcsErrorKind {
        match self {
            VcsError::Spawn { .. } => VcsErrorKind::Unavailable,
            VcsError::Command { .. } => VcsErrorKind::CommandFailed,
            VcsError::Parse { .. } => VcsErrorKind::Parse,
        }
    }
}
