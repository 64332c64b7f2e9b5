// ABOUTME: Version-control capability trait used by the rollout engine.
// ABOUTME: Exports the git command-line implementation and its error type.

mod error;
mod git;

pub use error::{VcsError, VcsErrorKind};
pub use git::GitCli;

use async_trait::async_trait;

use crate::types::{CommitId, TagName};

/// A tag as reported by the repository: name, peeled target and annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
    pub name: TagName,
    pub target: CommitId,
    pub message: String,
}

/// A branch head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBranch {
    pub name: String,
    pub target: CommitId,
}

/// Repository operations the engine needs.
///
/// Everything network-facing (`fetch_tags`, `pull`, `push`) is only called
/// when remote access is enabled; the engine short-circuits before reaching
/// these in no-remote mode.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Fetch tags from the configured remote.
    async fn fetch_tags(&self) -> Result<(), VcsError>;

    /// Fast-forward the checked out branch from its upstream.
    async fn pull(&self) -> Result<(), VcsError>;

    /// Push a fully qualified ref (e.g. `refs/tags/sheep-20080825-2105`).
    async fn push(&self, refname: &str) -> Result<(), VcsError>;

    /// Commit currently checked out.
    async fn current_commit(&self) -> Result<CommitId, VcsError>;

    /// Create an annotated tag pointing at `target`.
    async fn create_annotated_tag(
        &self,
        name: &TagName,
        message: &str,
        target: &CommitId,
    ) -> Result<(), VcsError>;

    /// Tags whose short name matches the glob `pattern`.
    async fn list_tags(&self, pattern: &str) -> Result<Vec<RawTag>, VcsError>;

    /// Local branch heads.
    async fn list_branches(&self) -> Result<Vec<RawBranch>, VcsError>;

    /// Move HEAD and the working tree to `commit`, discarding changes.
    async fn reset_hard(&self, commit: &CommitId) -> Result<(), VcsError>;

    /// Whether tracked files match HEAD.
    async fn working_tree_clean(&self) -> Result<bool, VcsError>;

    /// Human-readable status of the working tree.
    async fn status_text(&self) -> Result<String, VcsError>;

    /// Textual diff between two revisions.
    async fn diff(&self, from: &str, to: &str) -> Result<String, VcsError>;
}
