// ABOUTME: Test support utilities.
// ABOUTME: In-memory Vcs fake, hook script helpers and an engine builder for integration tests.

// Each test binary only uses some of these helpers.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rollout::deploy::{ActionOptions, EngineSettings, Holder, RolloutEngine};
use rollout::types::{CommitId, EnvName, TagName};
use rollout::vcs::{RawBranch, RawTag, Vcs, VcsError};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("rollout=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

#[derive(Debug, Default)]
struct State {
    head: String,
    pull_target: Option<String>,
    tags: Vec<RawTag>,
    branches: Vec<RawBranch>,
    clean: bool,
    fetches: usize,
    pulls: usize,
    pushes: Vec<String>,
    resets: Vec<String>,
}

/// Repository fake: tags and HEAD live in memory, every call is recorded.
#[derive(Debug)]
pub struct FakeVcs {
    state: Mutex<State>,
}

impl FakeVcs {
    pub fn new(head: &str) -> Self {
        Self {
            state: Mutex::new(State {
                head: head.to_string(),
                clean: true,
                ..State::default()
            }),
        }
    }

    pub fn with_tag(self, name: &str, target: &str, message: &str) -> Self {
        self.state.lock().unwrap().tags.push(RawTag {
            name: TagName::new(name),
            target: CommitId::new(target),
            message: message.to_string(),
        });
        self
    }

    pub fn with_branch(self, name: &str, target: &str) -> Self {
        self.state.lock().unwrap().branches.push(RawBranch {
            name: name.to_string(),
            target: CommitId::new(target),
        });
        self
    }

    /// `pull` moves HEAD to `commit`.
    pub fn with_pull_target(self, commit: &str) -> Self {
        self.state.lock().unwrap().pull_target = Some(commit.to_string());
        self
    }

    pub fn dirty(self) -> Self {
        self.state.lock().unwrap().clean = false;
        self
    }

    pub fn head(&self) -> String {
        self.state.lock().unwrap().head.clone()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .tags
            .iter()
            .map(|t| t.name.to_string())
            .collect()
    }

    pub fn tag(&self, name: &str) -> Option<RawTag> {
        self.state
            .lock()
            .unwrap()
            .tags
            .iter()
            .find(|t| t.name.as_str() == name)
            .cloned()
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub fn resets(&self) -> Vec<String> {
        self.state.lock().unwrap().resets.clone()
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }

    pub fn fetches(&self) -> usize {
        self.state.lock().unwrap().fetches
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn fetch_tags(&self) -> Result<(), VcsError> {
        self.state.lock().unwrap().fetches += 1;
        Ok(())
    }

    async fn pull(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.pulls += 1;
        if let Some(target) = state.pull_target.take() {
            state.head = target;
        }
        Ok(())
    }

    async fn push(&self, refname: &str) -> Result<(), VcsError> {
        self.state.lock().unwrap().pushes.push(refname.to_string());
        Ok(())
    }

    async fn current_commit(&self) -> Result<CommitId, VcsError> {
        Ok(CommitId::new(self.state.lock().unwrap().head.clone()))
    }

    async fn create_annotated_tag(
        &self,
        name: &TagName,
        message: &str,
        target: &CommitId,
    ) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        if state.tags.iter().any(|t| &t.name == name) {
            return Err(VcsError::Command {
                args: format!("tag -a {name}"),
                code: Some(128),
                stderr: format!("fatal: tag '{name}' already exists"),
            });
        }
        state.tags.push(RawTag {
            name: name.clone(),
            target: target.clone(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn list_tags(&self, pattern: &str) -> Result<Vec<RawTag>, VcsError> {
        let prefix = pattern.trim_end_matches('*');
        Ok(self
            .state
            .lock()
            .unwrap()
            .tags
            .iter()
            .filter(|t| t.name.as_str().starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn list_branches(&self) -> Result<Vec<RawBranch>, VcsError> {
        Ok(self.state.lock().unwrap().branches.clone())
    }

    async fn reset_hard(&self, commit: &CommitId) -> Result<(), VcsError> {
        let mut state = self.state.lock().unwrap();
        state.resets.push(commit.to_string());
        state.head = commit.to_string();
        Ok(())
    }

    async fn working_tree_clean(&self) -> Result<bool, VcsError> {
        Ok(self.state.lock().unwrap().clean)
    }

    async fn status_text(&self) -> Result<String, VcsError> {
        Ok(" M lib/sheep.rb\n".to_string())
    }

    async fn diff(&self, from: &str, to: &str) -> Result<String, VcsError> {
        Ok(format!("diff {from}..{to}\n"))
    }
}

pub fn sheep() -> EnvName {
    EnvName::new("sheep").unwrap()
}

pub fn alice() -> Holder {
    Holder {
        user: "alice".to_string(),
        host: "pasture".to_string(),
        pid: 4242,
    }
}

pub fn bob() -> Holder {
    Holder {
        user: "bob".to_string(),
        host: "barn".to_string(),
        pid: 777,
    }
}

/// 2008-08-25 21:05, the clock used by engines built here.
pub fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2008, 8, 25)
        .unwrap()
        .and_hms_opt(21, 5, 0)
        .unwrap()
}

/// Engine for environment `sheep` rooted at `root`, operated by alice.
pub fn engine(root: &Path, vcs: FakeVcs) -> RolloutEngine<FakeVcs> {
    engine_with(root, vcs, ActionOptions::default(), alice())
}

pub fn engine_with(
    root: &Path,
    vcs: FakeVcs,
    options: ActionOptions,
    operator: Holder,
) -> RolloutEngine<FakeVcs> {
    let settings = EngineSettings::for_root(root, sheep());
    RolloutEngine::new(vcs, settings, options)
        .unwrap()
        .with_operator(operator)
        .with_clock(fixed_now)
}

/// Write an executable script to `<root>/deploy/apps/<scope>/<file>`.
pub fn write_hook(root: &Path, scope: &str, file: &str, body: &str) -> PathBuf {
    let dir = root.join("deploy").join("apps").join(scope);
    write_script(&dir, file, body)
}

/// Write the sync hook for `env`.
pub fn write_sync(root: &Path, env: &str, body: &str) -> PathBuf {
    let dir = root.join("deploy").join("sync");
    write_script(&dir, &format!("{env}.sync"), body)
}

/// A hook body that appends `label` to `<root>/hooks.log`.
pub fn logging_hook(label: &str) -> String {
    format!("#!/bin/sh\necho {label} >> \"$ROLLOUT_ROOT/hooks.log\"\n")
}

/// Lines of `<root>/hooks.log`, empty if nothing ran.
pub fn hook_log(root: &Path) -> Vec<String> {
    fs::read_to_string(root.join("hooks.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn write_script(dir: &Path, file: &str, body: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(file);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

/// Identity for git commands run by tests and by the binary under test.
pub const GIT_IDENTITY: [(&str, &str); 4] = [
    ("GIT_AUTHOR_NAME", "Alice"),
    ("GIT_AUTHOR_EMAIL", "alice@example.com"),
    ("GIT_COMMITTER_NAME", "Alice"),
    ("GIT_COMMITTER_EMAIL", "alice@example.com"),
];

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = std::process::Command::new("git")
        .current_dir(dir)
        .args(args)
        .envs(GIT_IDENTITY)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

/// A fresh repository with one commit, or `None` when git is not installed.
pub fn git_repo() -> Option<tempfile::TempDir> {
    let available = std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("git not available, skipping");
        return None;
    }

    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "--quiet"]);
    git(dir.path(), &["config", "user.name", "Alice"]);
    git(dir.path(), &["config", "user.email", "alice@example.com"]);
    fs::write(dir.path().join("README"), "sheep\n").unwrap();
    git(dir.path(), &["add", "README"]);
    git(dir.path(), &["commit", "--quiet", "-m", "initial"]);
    Some(dir)
}
