// ABOUTME: Rollout state machine: start, sync, finish, abort, release, tag, revert and queries.
// ABOUTME: Checks every precondition before mutating, and keeps the lock when a step fails mid-way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use humantime_serde::re::humantime::format_duration;
use serde::Serialize;

use crate::diagnostics::{Diagnostics, Warning};
use crate::hooks::{
    ExecutionPath, HookContext, HookError, HookFailure, HookPhase, HookRunner,
};
use crate::notify::{Announcement, Notifier};
use crate::tags::{DEFAULT_DATE_FORMAT, ListOptions, TagError, TagRecord, TagRepository};
use crate::types::{CommitId, EnvName, TagName};
use crate::vcs::Vcs;

use super::error::DeployError;
use super::lock::{Holder, LockManager, LockRecord, RolloutPhase};
use super::policy;
use super::record::{self, DeployFileStore, DeployRecord, RecordError};
use super::state::RolloutState;

const DEFAULT_HOOKS_DIR: &str = "deploy";
const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(60 * 60);
const DEPLOY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HINT_NOT_LOCKED: &str = "nothing was changed and the lock was not taken";
const HINT_LOCK_HELD: &str = "the lock is still held; fix the problem and retry, or run `rollout abort`";
const HINT_FINISH: &str = "the lock is still held; fix the hook and run `rollout finish` again";

/// Where things live for one deployment root.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub root: PathBuf,
    pub environment: EnvName,
    /// strftime pattern embedded in tag names.
    pub date_format: String,
    pub hooks_dir: PathBuf,
    pub deploy_file: PathBuf,
    pub lock_path: PathBuf,
    pub block_file: Option<PathBuf>,
    /// Required process umask, if the site enforces one.
    pub umask: Option<u32>,
    pub can_make_tags: bool,
    pub stale_lock_after: Duration,
}

impl EngineSettings {
    /// Defaults for `root`: hooks in `deploy/`, lock under `.git/`, deploy file in `lib/` or the root.
    pub fn for_root(root: &Path, environment: EnvName) -> Self {
        Self {
            root: root.to_path_buf(),
            environment,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            hooks_dir: root.join(DEFAULT_HOOKS_DIR),
            deploy_file: DeployFileStore::resolve(root, None).path().to_path_buf(),
            lock_path: LockManager::for_root(root).path().to_path_buf(),
            block_file: None,
            umask: None,
            can_make_tags: false,
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone)]
pub struct ActionOptions {
    /// Override lock ownership and umask checks.
    pub force: bool,
    pub check_clean: bool,
    /// Allow fetch, pull and push.
    pub remote: bool,
    /// Operator-supplied text for tag annotations and the deploy record.
    pub message: Option<String>,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            force: false,
            check_clean: true,
            remote: true,
            message: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub lock: LockRecord,
    /// HEAD after the optional pull.
    pub head: CommitId,
    pub pulled: bool,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub tag: TagRecord,
    /// `Unlocked` after an automatic finish, `SyncPending` after `manual-sync`.
    pub state: RolloutState,
    pub reverted_to: Option<TagName>,
}

#[derive(Debug, Clone)]
pub struct FinishOutcome {
    pub tag: Option<TagName>,
    pub notified: bool,
}

#[derive(Debug, Clone)]
pub struct AbortOutcome {
    /// Commit the tree was reset to; `None` when a forced abort found no usable lock.
    pub restored_to: Option<CommitId>,
    pub hook_failures: Vec<HookFailure>,
    pub released: Option<LockRecord>,
}

#[derive(Debug, Clone)]
pub struct TagOutcome {
    pub tag: TagRecord,
    pub pushed: bool,
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub from: TagName,
    pub to: CommitId,
    pub diff: String,
}

/// Snapshot for `rollout status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub environment: EnvName,
    pub state: RolloutState,
    pub lock: Option<LockRecord>,
    pub stale: bool,
    pub head: CommitId,
    /// Deploy record, present only when it describes HEAD.
    pub record: Option<DeployRecord>,
    pub record_current: bool,
}

/// Drives rollout actions for one environment of one deployment root.
pub struct RolloutEngine<V: Vcs> {
    vcs: V,
    settings: EngineSettings,
    options: ActionOptions,
    operator: Holder,
    locks: LockManager,
    records: DeployFileStore,
    hooks: HookRunner,
    notifier: Option<Box<dyn Notifier>>,
    diag: Diagnostics,
    clock: fn() -> NaiveDateTime,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

impl<V: Vcs> RolloutEngine<V> {
    pub fn new(vcs: V, settings: EngineSettings, options: ActionOptions) -> Result<Self, DeployError> {
        crate::tags::validate_date_format(&settings.date_format)?;
        Ok(Self {
            locks: LockManager::new(&settings.lock_path),
            records: DeployFileStore::new(&settings.deploy_file),
            hooks: HookRunner::new(&settings.hooks_dir, &settings.environment),
            vcs,
            settings,
            options,
            operator: Holder::current(),
            notifier: None,
            diag: Diagnostics::default(),
            clock: local_now,
        })
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_operator(mut self, operator: Holder) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        self.diag.take()
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn deploy_file(&self) -> &DeployFileStore {
        &self.records
    }

    fn tags(&self) -> Result<TagRepository<'_, V>, DeployError> {
        Ok(TagRepository::new(
            &self.vcs,
            &self.settings.date_format,
            self.options.remote,
        )?)
    }

    /// Default listing options for this environment.
    pub fn list_options(&self) -> ListOptions {
        ListOptions::new(self.settings.environment.clone())
    }

    // ---- actions -------------------------------------------------------

    /// Take the lock and bring the tree up to date. `hotfix` skips the pull.
    pub async fn start(&mut self, hotfix: bool) -> Result<StartOutcome, DeployError> {
        let action = if hotfix { "hotfix" } else { "start" };
        self.check_preconditions().await?;

        let start_commit = self.vcs.current_commit().await?;
        let ctx = self.context(action, &start_commit, None);
        self.run_hooks(HookPhase::PreStart, &ctx, ExecutionPath::Forward, HINT_NOT_LOCKED)
            .await?;

        let lock = self.acquire(action, start_commit.clone())?;

        let mut head = start_commit;
        let pulled = !hotfix && self.options.remote;
        if pulled {
            self.run_hooks(HookPhase::PrePull, &ctx, ExecutionPath::Forward, HINT_LOCK_HELD)
                .await?;
            tracing::info!("Pulling latest changes");
            self.vcs.pull().await?;
            head = self.vcs.current_commit().await?;

            let ctx = self.context(action, &head, None);
            self.run_hooks(HookPhase::PostPull, &ctx, ExecutionPath::Forward, HINT_LOCK_HELD)
                .await?;
            self.run_hooks(
                HookPhase::PostTreeUpdate,
                &ctx,
                ExecutionPath::Forward,
                HINT_LOCK_HELD,
            )
            .await?;
        } else {
            tracing::info!("Skipping pull ({})", if hotfix { "hotfix" } else { "no remote" });
        }

        Ok(StartOutcome { lock, head, pulled })
    }

    /// Cut the rollout tag and run the sync hook; finishes automatically on success.
    pub async fn sync(&mut self) -> Result<SyncOutcome, DeployError> {
        let lock = self.require_own_lock()?;
        require_state("sync", &lock, RolloutState::Started, "run `rollout finish` or `rollout abort`")?;
        self.hooks
            .sync_hook()
            .map_err(|e| DeployError::hook(e, "nothing was changed; the lock is still held"))?;

        let (lock, tag) = self.cut_rollout(lock, "sync", None).await?;
        self.sync_and_finish(lock, tag, "sync", None).await
    }

    /// Cut the rollout tag and stop; the operator syncs by hand and then runs `finish`.
    pub async fn manual_sync(&mut self) -> Result<SyncOutcome, DeployError> {
        let lock = self.require_own_lock()?;
        require_state(
            "manual-sync",
            &lock,
            RolloutState::Started,
            "run `rollout finish` or `rollout abort`",
        )?;

        let (_, tag) = self.cut_rollout(lock, "manual-sync", None).await?;
        tracing::info!("Tag {} cut; sync by hand, then run `rollout finish`", tag.name);
        Ok(SyncOutcome {
            tag,
            state: RolloutState::SyncPending,
            reverted_to: None,
        })
    }

    /// Close a rollout whose tag has been cut.
    pub async fn finish(&mut self) -> Result<FinishOutcome, DeployError> {
        let lock = self.require_own_lock()?;
        let state = RolloutState::from_lock(Some(&lock));
        if !state.can_finish() {
            return Err(DeployError::InvalidState {
                action: "finish",
                state,
                hint: "run `rollout sync` or `rollout manual-sync` first, or `rollout abort`",
            });
        }
        self.complete(lock).await
    }

    /// Reset to the commit the rollout started from and drop the lock.
    ///
    /// Hook failures while restoring the tree are reported, never fatal.
    pub async fn abort(&mut self) -> Result<AbortOutcome, DeployError> {
        let force = self.options.force;
        let lock = match self.locks.inspect() {
            Ok(Some(lock)) => Some(lock),
            Ok(None) if force => None,
            Ok(None) => return Err(DeployError::NotLocked),
            Err(err) if force => {
                self.diag
                    .warn(Warning::lock_overridden(format!("discarding unreadable lock: {err}")));
                None
            }
            Err(err) => return Err(err),
        };

        let mut outcome = AbortOutcome {
            restored_to: None,
            hook_failures: Vec::new(),
            released: None,
        };

        if let Some(lock) = &lock {
            if !lock.holder.same_operator(&self.operator) {
                if !force {
                    return Err(DeployError::already_locked(lock.holder_info()));
                }
                self.diag.warn(Warning::lock_overridden(format!(
                    "aborting rollout of {} started by {}",
                    lock.environment,
                    lock.holder_info()
                )));
            }

            tracing::info!("Resetting working tree to {}", lock.start_commit.short());
            self.vcs.reset_hard(&lock.start_commit).await?;
            let ctx = self.context("abort", &lock.start_commit, lock.tag.clone());
            outcome.hook_failures = self.restore_tree(&ctx).await;
            outcome.restored_to = Some(lock.start_commit.clone());
        }

        outcome.released = self.locks.release(&self.operator, force)?;
        Ok(outcome)
    }

    /// Tag, record and close a started rollout without a sync hook.
    pub async fn release(&mut self) -> Result<FinishOutcome, DeployError> {
        self.require_tag_permission("release")?;
        let lock = self.require_own_lock()?;
        require_state("release", &lock, RolloutState::Started, "run `rollout finish` or `rollout abort`")?;

        let (lock, _) = self.cut_rollout(lock, "release", None).await?;
        self.complete(lock).await
    }

    /// Tag HEAD outside the lock lifecycle. `push == false` keeps the tag local.
    pub async fn tag(&mut self, push: bool) -> Result<TagOutcome, DeployError> {
        self.require_tag_permission("tag")?;
        if let Some(lock) = self.locks.inspect()?
            && !lock.holder.same_operator(&self.operator)
        {
            if !self.options.force {
                return Err(DeployError::already_locked(lock.holder_info()));
            }
            self.diag.warn(Warning::lock_overridden(format!(
                "tagging while {} holds the lock",
                lock.holder
            )));
        }

        let tag = self.create_tag("tag", None, push).await?;
        self.write_record(&tag, "tag", None)?;
        Ok(TagOutcome {
            pushed: push && self.options.remote,
            tag,
        })
    }

    /// Tags offered by the revert menu, newest first.
    pub async fn revert_candidates(&self, limit: usize) -> Result<Vec<TagRecord>, DeployError> {
        Ok(self
            .tags()?
            .revert_candidates(&self.settings.environment, limit)
            .await?)
    }

    /// Roll back to the commit of tag `target` and run the sync pipeline on it.
    pub async fn revert(&mut self, target: &str) -> Result<SyncOutcome, DeployError> {
        self.hooks
            .sync_hook()
            .map_err(|e| DeployError::hook(e, HINT_NOT_LOCKED))?;
        self.check_preconditions().await?;
        let target = self
            .tags()?
            .find(&self.settings.environment, target)
            .await?;

        let start_commit = self.vcs.current_commit().await?;
        let ctx = self.context("revert", &start_commit, None);
        self.run_hooks(HookPhase::PreStart, &ctx, ExecutionPath::Forward, HINT_NOT_LOCKED)
            .await?;

        let lock = self.acquire("revert", start_commit)?;

        tracing::info!("Resetting working tree to {} ({})", target.name, target.target.short());
        self.vcs.reset_hard(&target.target).await?;
        let ctx = self.context("revert", &target.target, None);
        self.restore_tree(&ctx).await;

        let (lock, tag) = self.cut_rollout(lock, "revert", Some(&target.name)).await?;
        self.sync_and_finish(lock, tag, "revert", Some(target.name)).await
    }

    // ---- queries ---------------------------------------------------------

    pub async fn status(&mut self) -> Result<StatusReport, DeployError> {
        let lock = self.locks.inspect()?;
        let stale = lock
            .as_ref()
            .is_some_and(|l| l.is_stale(self.settings.stale_lock_after));
        if let Some(lock) = lock.as_ref().filter(|_| stale) {
            self.warn_stale(lock);
        }

        let head = self.vcs.current_commit().await?;
        let record = self.current_record(&head)?;
        Ok(StatusReport {
            environment: self.settings.environment.clone(),
            state: RolloutState::from_lock(lock.as_ref()),
            lock,
            stale,
            record_current: record.is_some(),
            record,
            head,
        })
    }

    /// Deploy record, when it describes HEAD.
    pub async fn show(&mut self) -> Result<Option<DeployRecord>, DeployError> {
        let head = self.vcs.current_commit().await?;
        self.current_record(&head)
    }

    /// Rollout tags pointing at HEAD.
    pub async fn show_tag(&self, opts: &ListOptions) -> Result<Vec<TagRecord>, DeployError> {
        Ok(self.tags()?.tags_at_head(opts).await?)
    }

    /// Rollout history, newest first.
    pub async fn log(
        &self,
        opts: &ListOptions,
        limit: Option<usize>,
    ) -> Result<Vec<TagRecord>, DeployError> {
        let mut listing = self.tags()?.list_tags(opts).await?;
        if let Some(limit) = limit {
            listing.truncate(limit);
        }
        Ok(listing)
    }

    /// Diff from the latest rollout tag (or `from`) to HEAD.
    pub async fn diff(&self, from: Option<&str>) -> Result<DiffOutcome, DeployError> {
        let env = &self.settings.environment;
        let tags = self.tags()?;
        let from = match from {
            Some(name) => tags.find(env, name).await?,
            None => tags
                .latest(env)
                .await?
                .ok_or_else(|| TagError::NoMatchingTag {
                    prefix: env.to_string(),
                    name: "(latest)".to_string(),
                })?,
        };
        let to = self.vcs.current_commit().await?;
        let diff = self.vcs.diff(from.name.as_str(), to.as_str()).await?;
        Ok(DiffOutcome {
            from: from.name,
            to,
            diff,
        })
    }

    // ---- steps -----------------------------------------------------------

    /// Lock, clean tree, block file, umask. Nothing is mutated here.
    async fn check_preconditions(&mut self) -> Result<(), DeployError> {
        match self.locks.inspect() {
            Ok(Some(lock)) => {
                if lock.is_stale(self.settings.stale_lock_after) {
                    self.warn_stale(&lock);
                }
                if !self.options.force {
                    return Err(DeployError::already_locked(lock.holder_info()));
                }
            }
            Ok(None) => {}
            Err(_) if self.options.force => {}
            Err(err) => return Err(err),
        }

        if self.options.check_clean && !self.vcs.working_tree_clean().await? {
            let status = self.vcs.status_text().await?;
            return Err(DeployError::DirtyWorkingTree { status });
        }

        if let Some(block) = &self.settings.block_file {
            let block = if block.is_absolute() {
                block.clone()
            } else {
                self.settings.root.join(block)
            };
            policy::check_block_file(&block)?;
        }

        if let Some(required) = self.settings.umask
            && !self.options.force
        {
            let probe_dir = self
                .locks
                .path()
                .parent()
                .unwrap_or(&self.settings.root)
                .to_path_buf();
            let actual = policy::probe_umask(&probe_dir)?;
            policy::check_umask(required, actual)?;
        }

        Ok(())
    }

    fn acquire(&mut self, action: &str, start_commit: CommitId) -> Result<LockRecord, DeployError> {
        let record = LockRecord::new(
            self.operator.clone(),
            action,
            self.settings.environment.clone(),
            start_commit,
        );
        let acquired = self.locks.acquire(record, self.options.force)?;
        if let Some(prior) = acquired.discarded {
            self.diag.warn(Warning::lock_overridden(format!(
                "discarded lock held by {}",
                prior.holder_info()
            )));
        }
        Ok(acquired.record)
    }

    fn require_own_lock(&mut self) -> Result<LockRecord, DeployError> {
        let lock = self.locks.inspect()?.ok_or(DeployError::NotLocked)?;
        if lock.is_stale(self.settings.stale_lock_after) {
            self.warn_stale(&lock);
        }
        if !lock.holder.same_operator(&self.operator) {
            if !self.options.force {
                return Err(DeployError::already_locked(lock.holder_info()));
            }
            self.diag.warn(Warning::lock_overridden(format!(
                "acting on the rollout of {}",
                lock.holder_info()
            )));
        }
        Ok(lock)
    }

    fn require_tag_permission(&self, action: &str) -> Result<(), DeployError> {
        if self.settings.can_make_tags {
            return Ok(());
        }
        Err(DeployError::PermissionDenied(format!(
            "environment {} may not {action} on its own \
             (set can_make_tags in rollout.yml or pass --can-make-tags)",
            self.settings.environment
        )))
    }

    /// `pre-sync`, tag, deploy record, lock phase `sync-pending`.
    async fn cut_rollout(
        &mut self,
        mut lock: LockRecord,
        action: &str,
        reverted_to: Option<&TagName>,
    ) -> Result<(LockRecord, TagRecord), DeployError> {
        let head = self.vcs.current_commit().await?;
        let ctx = self.context(action, &head, None);
        self.run_hooks(HookPhase::PreSync, &ctx, ExecutionPath::Forward, HINT_LOCK_HELD)
            .await?;

        let tag = self.create_tag(action, reverted_to, true).await?;
        self.write_record(&tag, action, reverted_to)?;

        lock.tag = Some(tag.name.clone());
        lock.phase = RolloutPhase::SyncPending;
        self.locks.update(&lock)?;
        Ok((lock, tag))
    }

    async fn create_tag(
        &self,
        action: &str,
        reverted_to: Option<&TagName>,
        push: bool,
    ) -> Result<TagRecord, DeployError> {
        let message = self.tag_message(action, reverted_to);
        let now = (self.clock)();
        Ok(self
            .tags()?
            .create_tag(&self.settings.environment, &message, now, push)
            .await?)
    }

    fn tag_message(&self, action: &str, reverted_to: Option<&TagName>) -> String {
        let subject = match reverted_to {
            Some(target) => format!("revert {} to {}", self.settings.environment, target),
            None => format!(
                "{} of {} by {}",
                action, self.settings.environment, self.operator.user
            ),
        };
        match &self.options.message {
            Some(message) if !message.trim().is_empty() => {
                format!("{subject}\n\n{}", message.trim_end())
            }
            _ => subject,
        }
    }

    fn write_record(
        &self,
        tag: &TagRecord,
        action: &str,
        reverted_to: Option<&TagName>,
    ) -> Result<(), DeployError> {
        let mut rec = DeployRecord::new();
        rec.set(record::KEY_COMMIT, tag.target.as_str());
        rec.set(record::KEY_TAG, tag.name.as_str());
        rec.set(
            record::KEY_DEPLOY_DATE,
            (self.clock)().format(DEPLOY_DATE_FORMAT).to_string(),
        );
        rec.set(record::KEY_DEPLOYED_FROM, self.operator.host.as_str());
        rec.set(record::KEY_DEPLOYED_BY, self.operator.user.as_str());
        rec.set(record::KEY_ENVIRONMENT, self.settings.environment.as_str());
        rec.set(record::KEY_ACTION, action);
        if let Some(target) = reverted_to {
            rec.set(record::KEY_REVERTED_TO, target.as_str());
        }
        rec.set_message(tag.message.clone());
        self.records.write(&rec)?;
        Ok(())
    }

    /// Run the sync hook for a freshly cut tag; finish on success, keep the lock on failure.
    async fn sync_and_finish(
        &mut self,
        mut lock: LockRecord,
        tag: TagRecord,
        action: &str,
        reverted_to: Option<TagName>,
    ) -> Result<SyncOutcome, DeployError> {
        let ctx = self.context(action, &tag.target, Some(tag.name.clone()));
        match self.hooks.run_sync(&ctx).await {
            Ok(()) => {
                lock.phase = RolloutPhase::Synced;
                self.locks.update(&lock)?;
                self.complete(lock).await?;
                Ok(SyncOutcome {
                    tag,
                    state: RolloutState::Unlocked,
                    reverted_to,
                })
            }
            Err(err) => {
                lock.phase = RolloutPhase::SyncFailed;
                self.locks.update(&lock)?;
                match err {
                    HookError::Failed {
                        script, exit_code, ..
                    } => Err(DeployError::SyncFailed {
                        script,
                        exit_code,
                        tag: tag.name,
                    }),
                    other => Err(DeployError::hook(
                        other,
                        format!(
                            "tag {} was created and the lock is still held; \
                             sync by hand, then run `rollout finish` (or `rollout abort`)",
                            tag.name
                        ),
                    )),
                }
            }
        }
    }

    /// `post-sync` (once), announcement, lock release.
    async fn complete(&mut self, mut lock: LockRecord) -> Result<FinishOutcome, DeployError> {
        let head = self.vcs.current_commit().await?;
        if !lock.post_sync_ran {
            let ctx = self.context(&lock.action, &head, lock.tag.clone());
            self.run_hooks(HookPhase::PostSync, &ctx, ExecutionPath::Forward, HINT_FINISH)
                .await?;
            lock.post_sync_ran = true;
            lock.phase = RolloutPhase::Synced;
            self.locks.update(&lock)?;
        }

        let notified = self.announce(&lock, &head).await;
        self.locks.release(&self.operator, self.options.force)?;
        tracing::info!("Rollout of {} finished", self.settings.environment);
        Ok(FinishOutcome {
            tag: lock.tag,
            notified,
        })
    }

    async fn announce(&mut self, lock: &LockRecord, head: &CommitId) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };
        let record = self.records.read_if_current(head).ok().flatten();
        let announcement = Announcement {
            environment: self.settings.environment.clone(),
            tag: lock.tag.clone(),
            operator: self.operator.user.clone(),
            host: self.operator.host.clone(),
            action: lock.action.clone(),
            record,
        };
        match notifier.notify(&announcement).await {
            Ok(()) => true,
            Err(err) => {
                self.diag.warn(Warning::notification_failed(format!(
                    "rollout finished but the announcement failed: {err}"
                )));
                false
            }
        }
    }

    /// `post-reset` then `post-tree-update`, collecting failures as warnings.
    async fn restore_tree(&mut self, ctx: &HookContext) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        for phase in [HookPhase::PostReset, HookPhase::PostTreeUpdate] {
            let policy = phase.policy(ExecutionPath::Rollback);
            match self.hooks.run(phase, ctx, policy).await {
                Ok(report) => {
                    for skipped in &report.skipped {
                        self.diag.warn(Warning::non_executable_hook(format!(
                            "skipped non-executable {} hook {}",
                            phase,
                            skipped.display()
                        )));
                    }
                    for failure in &report.failures {
                        self.diag.warn(Warning::hook_failed(failure));
                    }
                    failures.extend(report.failures);
                }
                Err(err) => self.diag.warn(Warning::hooks_unavailable(phase, &err)),
            }
        }
        failures
    }

    async fn run_hooks(
        &mut self,
        phase: HookPhase,
        ctx: &HookContext,
        path: ExecutionPath,
        hint: &str,
    ) -> Result<(), DeployError> {
        let report = self
            .hooks
            .run(phase, ctx, phase.policy(path))
            .await
            .map_err(|e| DeployError::hook(e, hint))?;
        for failure in &report.failures {
            self.diag.warn(Warning::hook_failed(failure));
        }
        Ok(())
    }

    fn context(&self, action: &str, commit: &CommitId, tag: Option<TagName>) -> HookContext {
        HookContext {
            root: self.settings.root.clone(),
            environment: self.settings.environment.clone(),
            commit: commit.clone(),
            deploy_file: self.records.path().to_path_buf(),
            action: action.to_string(),
            tag,
        }
    }

    fn current_record(&mut self, head: &CommitId) -> Result<Option<DeployRecord>, DeployError> {
        match self.records.read_if_current(head) {
            Ok(record) => Ok(record),
            Err(err @ RecordError::Malformed { .. }) => {
                self.diag.warn(Warning::malformed_record(err.to_string()));
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn warn_stale(&mut self, lock: &LockRecord) {
        self.diag.warn(Warning::stale_lock(format!(
            "lock held by {} is older than {}; if that rollout is dead, run `rollout abort --force`",
            lock.holder_info(),
            format_duration(self.settings.stale_lock_after)
        )));
    }
}

fn require_state(
    action: &'static str,
    lock: &LockRecord,
    expected: RolloutState,
    hint: &'static str,
) -> Result<(), DeployError> {
    let state = RolloutState::from_lock(Some(lock));
    if state == expected {
        Ok(())
    } else {
        Err(DeployError::InvalidState {
            action,
            state,
            hint,
        })
    }
}

