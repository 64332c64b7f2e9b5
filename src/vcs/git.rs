// ABOUTME: Vcs implementation that shells out to the git command-line tool.
// ABOUTME: Uses the operator's git configuration, credentials and ssh setup unchanged.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use snafu::{ResultExt, ensure};
use tokio::process::Command;

use super::error::{CommandSnafu, ParseSnafu, SpawnSnafu, VcsError};
use super::{RawBranch, RawTag, Vcs};
use crate::types::{CommitId, TagName};

/// Field separator inside one `for-each-ref` record.
const FIELD_SEP: char = '\0';
/// Record separator; tag messages may contain newlines.
const RECORD_SEP: char = '\u{1e}';

/// git repository driven through the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    remote: String,
}

impl GitCli {
    pub fn new(root: &Path, remote: impl Into<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            remote: remote.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run git with captured output and return stdout.
    async fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let joined = args.join(" ");
        tracing::debug!("git {} (in {})", joined, self.root.display());

        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context(SpawnSnafu {
                args: joined.clone(),
            })?;

        ensure!(
            output.status.success(),
            CommandSnafu {
                args: joined,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
        );

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run git with stdout/stderr passed through to the operator.
    async fn run_inherited(&self, args: &[&str]) -> Result<(), VcsError> {
        let joined = args.join(" ");
        tracing::debug!("git {} (in {})", joined, self.root.display());

        let status = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .status()
            .await
            .context(SpawnSnafu {
                args: joined.clone(),
            })?;

        ensure!(
            status.success(),
            CommandSnafu {
                args: joined,
                code: status.code(),
                stderr: String::new(),
            }
        );
        Ok(())
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn fetch_tags(&self) -> Result<(), VcsError> {
        self.run_inherited(&["fetch", "--tags", "--quiet", self.remote.as_str()])
            .await
    }

    async fn pull(&self) -> Result<(), VcsError> {
        self.run_inherited(&["pull", "--ff-only", "--quiet"]).await
    }

    async fn push(&self, refname: &str) -> Result<(), VcsError> {
        self.run_inherited(&["push", "--quiet", self.remote.as_str(), refname])
            .await
    }

    async fn current_commit(&self) -> Result<CommitId, VcsError> {
        let out = self.run(&["rev-parse", "--verify", "HEAD"]).await?;
        let hash = out.trim();
        ensure!(
            !hash.is_empty(),
            ParseSnafu {
                args: "rev-parse --verify HEAD",
                detail: "empty commit hash",
            }
        );
        Ok(CommitId::new(hash))
    }

    async fn create_annotated_tag(
        &self,
        name: &TagName,
        message: &str,
        target: &CommitId,
    ) -> Result<(), VcsError> {
        self.run(&["tag", "-a", "-m", message, name.as_str(), target.as_str()])
            .await
            .map(|_| ())
    }

    async fn list_tags(&self, pattern: &str) -> Result<Vec<RawTag>, VcsError> {
        let refpattern = format!("refs/tags/{pattern}");
        let out = self
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)%00%(objectname)%00%(*objectname)%00%(contents)%1e",
                refpattern.as_str(),
            ])
            .await?;
        parse_tag_records(&out)
    }

    async fn list_branches(&self) -> Result<Vec<RawBranch>, VcsError> {
        let out = self
            .run(&[
                "for-each-ref",
                "--format=%(refname:short)%00%(objectname)",
                "refs/heads",
            ])
            .await?;
        parse_branch_records(&out)
    }

    async fn reset_hard(&self, commit: &CommitId) -> Result<(), VcsError> {
        self.run(&["reset", "--hard", "--quiet", commit.as_str()])
            .await
            .map(|_| ())
    }

    async fn working_tree_clean(&self) -> Result<bool, VcsError> {
        let out = self
            .run(&["status", "--porcelain", "--untracked-files=no"])
            .await?;
        Ok(out.trim().is_empty())
    }

    async fn status_text(&self) -> Result<String, VcsError> {
        self.run(&["status", "--short", "--branch"]).await
    }

    async fn diff(&self, from: &str, to: &str) -> Result<String, VcsError> {
        self.run(&["diff", from, to]).await
    }
}

/// Parse `for-each-ref` output produced with the tag format above.
///
/// Annotated tags carry the peeled commit in the third field; lightweight tags
/// leave it empty and point at the commit directly.
fn parse_tag_records(out: &str) -> Result<Vec<RawTag>, VcsError> {
    let mut tags = Vec::new();
    for record in out.split(RECORD_SEP) {
        let record = record.trim_start_matches('\n');
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(4, FIELD_SEP);
        let (Some(name), Some(object), Some(peeled)) = (fields.next(), fields.next(), fields.next())
        else {
            return ParseSnafu {
                args: "for-each-ref refs/tags",
                detail: format!("truncated record {record:?}"),
            }
            .fail();
        };
        let message = fields.next().unwrap_or_default().trim_end().to_string();
        let target = if peeled.is_empty() { object } else { peeled };
        tags.push(RawTag {
            name: TagName::new(name),
            target: CommitId::new(target),
            message,
        });
    }
    Ok(tags)
}

fn parse_branch_records(out: &str) -> Result<Vec<RawBranch>, VcsError> {
    out.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once(FIELD_SEP) {
            Some((name, target)) => Ok(RawBranch {
                name: name.to_string(),
                target: CommitId::new(target.trim()),
            }),
            None => ParseSnafu {
                args: "for-each-ref refs/heads",
                detail: format!("malformed line {line:?}"),
            }
            .fail(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_annotated_and_lightweight_tags() {
        let out = "sheep-20080825-2105\0aaaa\0c0ffee\0first rollout\nline two\n\u{1e}\n\
                   sheep-20080825-2116\0c0ffee\0\0\u{1e}\n";
        let tags = parse_tag_records(out).unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name.as_str(), "sheep-20080825-2105");
        assert_eq!(tags[0].target.as_str(), "c0ffee");
        assert_eq!(tags[0].message, "first rollout\nline two");
        assert_eq!(tags[1].target.as_str(), "c0ffee");
        assert_eq!(tags[1].message, "");
    }

    #[test]
    fn empty_output_has_no_tags() {
        assert!(parse_tag_records("").unwrap().is_empty());
    }

    #[test]
    fn truncated_tag_record_is_parse_error() {
        let err = parse_tag_records("lonely-name\u{1e}").unwrap_err();
        assert_eq!(err.kind(), super::super::VcsErrorKind::Parse);
    }

    #[test]
    fn parses_branches() {
        let branches = parse_branch_records("master\0abc\ntrunk\0def\n").unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].name, "trunk");
        assert_eq!(branches[1].target.as_str(), "def");
    }
}
