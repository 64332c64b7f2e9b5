// ABOUTME: Exclusive rollout lock stored as JSON next to the repository metadata.
// ABOUTME: Acquisition links a fully written temp file into place so creation is atomic.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CommitId, EnvName, TagName};

use super::error::{DeployError, LockHolderInfo};

/// Lock file location inside `.git` when the root is a plain clone.
const GIT_LOCK_PATH: &str = ".git/rollout/lock";

/// Lock file location when `.git` is not a directory (worktrees, exports).
const FALLBACK_LOCK_PATH: &str = ".rollout.lock";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identity of an operator holding the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    pub user: String,
    pub host: String,
    pub pid: u32,
}

impl Holder {
    /// The operator running this process.
    pub fn current() -> Self {
        let user = ["USER", "LOGNAME", "USERNAME"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            user,
            host: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
        }
    }

    /// Ownership is decided by user name; host and pid are informational.
    pub fn same_operator(&self, other: &Holder) -> bool {
        self.user == other.user
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} (pid {})", self.user, self.host, self.pid)
    }
}

/// Progress of the rollout holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RolloutPhase {
    Started,
    SyncPending,
    SyncFailed,
    Synced,
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: Holder,
    pub acquired_at: DateTime<Utc>,
    /// Action that took the lock: `start`, `hotfix`, `revert` or `release`.
    pub action: String,
    pub environment: EnvName,
    /// HEAD before anything moved it; `abort` resets here.
    pub start_commit: CommitId,
    pub phase: RolloutPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<TagName>,
    #[serde(default)]
    pub post_sync_ran: bool,
}

impl LockRecord {
    pub fn new(
        holder: Holder,
        action: impl Into<String>,
        environment: EnvName,
        start_commit: CommitId,
    ) -> Self {
        Self {
            holder,
            acquired_at: Utc::now(),
            action: action.into(),
            environment,
            start_commit,
            phase: RolloutPhase::Started,
            tag: None,
            post_sync_ran: false,
        }
    }

    /// True once the lock is older than `threshold`. Only used for warnings.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        let age = Utc::now() - self.acquired_at;
        age.to_std().map(|age| age >= threshold).unwrap_or(false)
    }

    pub fn holder_info(&self) -> LockHolderInfo {
        LockHolderInfo {
            holder: self.holder.clone(),
            acquired_at: self.acquired_at,
            action: self.action.clone(),
        }
    }
}

/// Outcome of a successful acquisition.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub record: LockRecord,
    /// Record that was replaced under `force`, if any.
    pub discarded: Option<LockRecord>,
}

/// Manages the lock file for one deployment root.
#[derive(Debug, Clone)]
pub struct LockManager {
    path: PathBuf,
}

impl LockManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default lock location for a deployment root.
    pub fn for_root(root: &Path) -> Self {
        if root.join(".git").is_dir() {
            Self::new(root.join(GIT_LOCK_PATH))
        } else {
            Self::new(root.join(FALLBACK_LOCK_PATH))
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lock contents, without side effects.
    pub fn inspect(&self) -> Result<Option<LockRecord>, DeployError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DeployError::io(&self.path, e)),
        };
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| DeployError::LockCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Take the lock. Without `force`, fails with `AlreadyLocked` if any lock exists.
    ///
    /// A loser never sees a half-written record: the full record is written to a
    /// temp file first and then hard-linked into place.
    pub fn acquire(&self, record: LockRecord, force: bool) -> Result<Acquired, DeployError> {
        self.ensure_parent()?;
        let temp = self.write_temp(&record)?;

        let linked = fs::hard_link(&temp, &self.path);
        match linked {
            Ok(()) => {
                remove_quietly(&temp);
                tracing::info!(holder = %record.holder, action = %record.action, "acquired rollout lock");
                Ok(Acquired {
                    record,
                    discarded: None,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if !force {
                    remove_quietly(&temp);
                    return Err(self.contention()?);
                }
                let discarded = self.inspect().unwrap_or_else(|err| {
                    tracing::warn!("discarding unreadable lock: {}", err);
                    None
                });
                if let Err(e) = fs::rename(&temp, &self.path) {
                    remove_quietly(&temp);
                    return Err(DeployError::io(&self.path, e));
                }
                if let Some(prior) = &discarded {
                    tracing::warn!(
                        "discarded rollout lock held by {} since {} (action: {})",
                        prior.holder,
                        prior.acquired_at,
                        prior.action
                    );
                }
                Ok(Acquired { record, discarded })
            }
            Err(e) => {
                remove_quietly(&temp);
                Err(DeployError::io(&self.path, e))
            }
        }
    }

    /// Rewrite the lock held by `record.holder` to reflect phase progress.
    pub fn update(&self, record: &LockRecord) -> Result<(), DeployError> {
        match self.inspect()? {
            None => return Err(DeployError::NotLocked),
            Some(current) if !current.holder.same_operator(&record.holder) => {
                return Err(DeployError::already_locked(current.holder_info()));
            }
            Some(_) => {}
        }
        let temp = self.write_temp(record)?;
        fs::rename(&temp, &self.path).map_err(|e| {
            remove_quietly(&temp);
            DeployError::io(&self.path, e)
        })
    }

    /// Drop the lock. Returns the record that was removed.
    ///
    /// With `force`, a missing lock is not an error and another user's lock is removed.
    pub fn release(
        &self,
        expected: &Holder,
        force: bool,
    ) -> Result<Option<LockRecord>, DeployError> {
        let current = match self.inspect() {
            Ok(None) if force => return Ok(None),
            Ok(None) => return Err(DeployError::NotLocked),
            Ok(Some(current)) => Some(current),
            Err(err) if force => {
                tracing::warn!("removing unreadable lock: {}", err);
                None
            }
            Err(err) => return Err(err),
        };

        if let Some(current) = &current
            && !force
            && !current.holder.same_operator(expected)
        {
            return Err(DeployError::already_locked(current.holder_info()));
        }

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound && force => {}
            Err(e) => return Err(DeployError::io(&self.path, e)),
        }
        tracing::info!("released rollout lock");
        Ok(current)
    }

    fn contention(&self) -> Result<DeployError, DeployError> {
        match self.inspect()? {
            Some(existing) => Ok(DeployError::already_locked(existing.holder_info())),
            // Released between our link attempt and the read.
            None => Err(DeployError::io(
                &self.path,
                io::Error::new(io::ErrorKind::AlreadyExists, "lock changed hands during acquisition"),
            )),
        }
    }

    fn ensure_parent(&self) -> Result<(), DeployError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| DeployError::io(parent, e))?;
        }
        Ok(())
    }

    fn write_temp(&self, record: &LockRecord) -> Result<PathBuf, DeployError> {
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            DeployError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.tmp", std::process::id(), seq));
        let temp = self.path.with_file_name(name);

        let write = || -> io::Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()
        };
        write().map_err(|e| {
            remove_quietly(&temp);
            DeployError::io(&temp, e)
        })?;
        Ok(temp)
    }
}

pub(super) fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!("failed to remove {}: {}", path.display(), e);
    }
}
