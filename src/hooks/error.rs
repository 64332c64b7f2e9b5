// ABOUTME: Error types for hook discovery and execution.
// ABOUTME: Failures name the phase, the script and its exit code.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    /// A hook exited nonzero under the abort policy.
    #[error("{phase} hook {} failed with {}", .script.display(), exit_label(.exit_code))]
    Failed {
        phase: String,
        script: PathBuf,
        exit_code: Option<i32>,
    },

    /// A file matching the phase is not executable.
    #[error("{phase} hook {} is not executable (chmod +x it or remove it)", .script.display())]
    NotExecutable { phase: String, script: PathBuf },

    /// The hook could not be started at all.
    #[error("failed to execute hook {}: {source}", .script.display())]
    Spawn {
        script: PathBuf,
        source: std::io::Error,
    },

    /// The environment has no sync hook.
    #[error("no sync hook for {environment}: expected an executable at {}", .path.display())]
    SyncHookMissing { environment: String, path: PathBuf },

    /// A hook directory could not be read.
    #[error("failed to read hook directory {}: {source}", .dir.display())]
    Discovery {
        dir: PathBuf,
        source: std::io::Error,
    },
}

impl HookError {
    /// Exit code of the failing hook, if it ran and exited.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HookError::Failed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (killed by signal)".to_string(),
    }
}
