// ABOUTME: Hooks system for rollout lifecycle phases.
// ABOUTME: Discovers `deploy/apps/{common,<env>}/<phase>.*` scripts and runs them in order.

mod error;

pub use error::HookError;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;

use crate::types::{CommitId, EnvName, TagName};

/// Directory (under the hooks dir) holding per-phase application hooks.
const APPS_DIR: &str = "apps";
/// Directory (under the hooks dir) holding one sync hook per environment.
const SYNC_DIR: &str = "sync";
/// Scope directory shared by every environment.
const COMMON_SCOPE: &str = "common";

/// Hook execution points in the rollout lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    /// Before the lock is taken by `start`, `hotfix` and `revert`.
    PreStart,
    /// Before pulling new code during `start`.
    PrePull,
    /// After a successful pull.
    PostPull,
    /// Whenever the working tree changed (pull, reset).
    PostTreeUpdate,
    /// Before a rollout tag is cut.
    PreSync,
    /// After the sync hook succeeded, or from `finish`.
    PostSync,
    /// After the working tree was reset by `abort` or `revert`.
    PostReset,
}

impl HookPhase {
    pub const ALL: [HookPhase; 7] = [
        HookPhase::PreStart,
        HookPhase::PrePull,
        HookPhase::PostPull,
        HookPhase::PostTreeUpdate,
        HookPhase::PreSync,
        HookPhase::PostSync,
        HookPhase::PostReset,
    ];

    /// Filename prefix of hooks for this phase.
    pub fn name(&self) -> &'static str {
        match self {
            HookPhase::PreStart => "pre-start",
            HookPhase::PrePull => "pre-pull",
            HookPhase::PostPull => "post-pull",
            HookPhase::PostTreeUpdate => "post-tree-update",
            HookPhase::PreSync => "pre-sync",
            HookPhase::PostSync => "post-sync",
            HookPhase::PostReset => "post-reset",
        }
    }

    /// Failure policy of this phase on the given execution path.
    ///
    /// Restoring a tree on the rollback path must complete, so only
    /// `post-reset` and `post-tree-update` relax there.
    pub fn policy(&self, path: ExecutionPath) -> FailurePolicy {
        match (self, path) {
            (HookPhase::PostReset | HookPhase::PostTreeUpdate, ExecutionPath::Rollback) => {
                FailurePolicy::Continue
            }
            _ => FailurePolicy::Abort,
        }
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether hooks run while moving forward or while restoring a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Forward,
    /// `abort`, and the reset step of `revert`.
    Rollback,
}

/// What a failing hook does to the rest of the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// First nonzero exit stops the phase and the action.
    Abort,
    /// Failures are reported; remaining hooks still run.
    Continue,
}

/// Directory a hook was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookScope {
    Common,
    Environment(EnvName),
}

/// A discovered hook script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDescriptor {
    pub phase: HookPhase,
    pub scope: HookScope,
    pub path: PathBuf,
    /// Filename; hooks within a scope run in lexicographic order of this.
    pub sort_key: String,
    pub executable: bool,
}

/// Context passed to hooks via environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub root: PathBuf,
    pub environment: EnvName,
    pub commit: CommitId,
    pub deploy_file: PathBuf,
    /// Action that triggered the hook (`start`, `sync`, `revert`, ...).
    pub action: String,
    pub tag: Option<TagName>,
}

impl HookContext {
    /// Convert context to environment variables.
    pub fn to_env(&self, phase: &str) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert(
            "ROLLOUT_ROOT".to_string(),
            self.root.display().to_string(),
        );
        env.insert("ROLLOUT_ENV".to_string(), self.environment.to_string());
        env.insert("ROLLOUT_COMMIT".to_string(), self.commit.to_string());
        env.insert(
            "ROLLOUT_DEPLOY_FILE".to_string(),
            self.deploy_file.display().to_string(),
        );
        env.insert("ROLLOUT_PHASE".to_string(), phase.to_string());
        env.insert("ROLLOUT_ACTION".to_string(), self.action.clone());
        if let Some(ref tag) = self.tag {
            env.insert("ROLLOUT_TAG".to_string(), tag.to_string());
        }
        env
    }
}

/// A hook that exited nonzero (or could not be started) under `Continue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    pub phase: HookPhase,
    pub script: PathBuf,
    pub exit_code: Option<i32>,
}

impl std::fmt::Display for HookFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(
                f,
                "{} hook {} exited with {}",
                self.phase,
                self.script.display(),
                code
            ),
            None => write!(
                f,
                "{} hook {} did not exit normally",
                self.phase,
                self.script.display()
            ),
        }
    }
}

/// Outcome of running one phase.
#[derive(Debug, Default)]
pub struct HookReport {
    pub ran: Vec<PathBuf>,
    pub failures: Vec<HookFailure>,
    /// Matching files that were not executable.
    pub skipped: Vec<PathBuf>,
}

impl HookReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Discovers and runs hooks below a hooks directory.
pub struct HookRunner {
    hooks_dir: PathBuf,
    environment: EnvName,
    reported: Mutex<HashSet<PathBuf>>,
}

impl HookRunner {
    /// Create a runner for `environment` looking in `hooks_dir` (usually `<root>/deploy`).
    pub fn new(hooks_dir: &Path, environment: &EnvName) -> Self {
        Self {
            hooks_dir: hooks_dir.to_path_buf(),
            environment: environment.clone(),
            reported: Mutex::new(HashSet::new()),
        }
    }

    pub fn hooks_dir(&self) -> &Path {
        &self.hooks_dir
    }

    /// Scope directories in execution order: common first, then the environment.
    pub fn scope_dirs(&self) -> Vec<(HookScope, PathBuf)> {
        let apps = self.hooks_dir.join(APPS_DIR);
        vec![
            (HookScope::Common, apps.join(COMMON_SCOPE)),
            (
                HookScope::Environment(self.environment.clone()),
                apps.join(self.environment.as_str()),
            ),
        ]
    }

    /// List the hooks of `phase` in execution order.
    pub fn discover(&self, phase: HookPhase) -> Result<Vec<HookDescriptor>, HookError> {
        let prefix = format!("{}.", phase.name());
        let mut hooks = Vec::new();

        for (scope, dir) in self.scope_dirs() {
            if !dir.is_dir() {
                continue;
            }
            let entries = std::fs::read_dir(&dir).map_err(|source| HookError::Discovery {
                dir: dir.clone(),
                source,
            })?;

            let mut found = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| HookError::Discovery {
                    dir: dir.clone(),
                    source,
                })?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if !file_name.starts_with(&prefix) {
                    continue;
                }
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                found.push(HookDescriptor {
                    phase,
                    scope: scope.clone(),
                    executable: is_executable(&path),
                    path,
                    sort_key: file_name,
                });
            }
            found.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
            hooks.extend(found);
        }

        Ok(hooks)
    }

    /// Run every hook of `phase` sequentially.
    ///
    /// Under [`FailurePolicy::Abort`] the first failure is returned as an
    /// error and the remaining hooks do not run; a non-executable hook fails
    /// the phase before anything runs. Under [`FailurePolicy::Continue`]
    /// failures are collected in the report.
    pub async fn run(
        &self,
        phase: HookPhase,
        context: &HookContext,
        policy: FailurePolicy,
    ) -> Result<HookReport, HookError> {
        let hooks = self.discover(phase)?;
        let mut report = HookReport::default();

        for hook in hooks.iter().filter(|h| !h.executable) {
            self.report_not_executable(hook);
            if policy == FailurePolicy::Abort {
                return Err(HookError::NotExecutable {
                    phase: phase.name().to_string(),
                    script: hook.path.clone(),
                });
            }
            report.skipped.push(hook.path.clone());
        }

        for hook in hooks.iter().filter(|h| h.executable) {
            tracing::info!("Running {} hook: {}", phase, hook.path.display());

            let exit_code = match self.exec(&hook.path, phase.name(), context).await {
                Ok(status) if status.success() => {
                    report.ran.push(hook.path.clone());
                    continue;
                }
                Ok(status) => status.code(),
                Err(source) if policy == FailurePolicy::Abort => {
                    return Err(HookError::Spawn {
                        script: hook.path.clone(),
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!("Failed to execute {}: {}", hook.path.display(), e);
                    None
                }
            };
            report.ran.push(hook.path.clone());

            if policy == FailurePolicy::Abort {
                return Err(HookError::Failed {
                    phase: phase.name().to_string(),
                    script: hook.path.clone(),
                    exit_code,
                });
            }

            let failure = HookFailure {
                phase,
                script: hook.path.clone(),
                exit_code,
            };
            tracing::warn!("{} (continuing)", failure);
            report.failures.push(failure);
        }

        Ok(report)
    }

    /// Path of this environment's sync hook, verified to exist and be executable.
    pub fn sync_hook(&self) -> Result<PathBuf, HookError> {
        let path = self
            .hooks_dir
            .join(SYNC_DIR)
            .join(format!("{}.sync", self.environment));

        if !path.is_file() {
            return Err(HookError::SyncHookMissing {
                environment: self.environment.to_string(),
                path,
            });
        }
        if !is_executable(&path) {
            return Err(HookError::NotExecutable {
                phase: "sync".to_string(),
                script: path,
            });
        }
        Ok(path)
    }

    /// Run the environment's sync hook.
    pub async fn run_sync(&self, context: &HookContext) -> Result<(), HookError> {
        let path = self.sync_hook()?;
        tracing::info!("Running sync hook: {}", path.display());

        let status = self
            .exec(&path, "sync", context)
            .await
            .map_err(|source| HookError::Spawn {
                script: path.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                phase: "sync".to_string(),
                script: path,
                exit_code: status.code(),
            })
        }
    }

    async fn exec(
        &self,
        path: &Path,
        phase: &str,
        context: &HookContext,
    ) -> std::io::Result<std::process::ExitStatus> {
        Command::new(path)
            .current_dir(&context.root)
            .envs(context.to_env(phase))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
    }

    fn report_not_executable(&self, hook: &HookDescriptor) {
        let first_time = self
            .reported
            .lock()
            .map(|mut seen| seen.insert(hook.path.clone()))
            .unwrap_or(true);
        if first_time {
            tracing::warn!(
                "{} hook {} is not executable (chmod +x to enable it)",
                hook.phase,
                hook.path.display()
            );
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
