// ABOUTME: Deploy record file: ordered `key: value` headers, a blank line, then a message.
// ABOUTME: Describes the most recent rollout and is only trusted when its commit is HEAD.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::types::CommitId;

pub const KEY_COMMIT: &str = "commit";
pub const KEY_TAG: &str = "tag";
pub const KEY_DEPLOY_DATE: &str = "deploy-date";
pub const KEY_DEPLOYED_FROM: &str = "deployed-from";
pub const KEY_DEPLOYED_BY: &str = "deployed-by";
pub const KEY_ENVIRONMENT: &str = "environment";
pub const KEY_ACTION: &str = "action";
pub const KEY_REVERTED_TO: &str = "reverted-to";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("no deploy record at {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed deploy record {} line {line}: {reason}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to access deploy record {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },
}

/// Parse failure before a path is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

/// Metadata for one rollout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployRecord {
    headers: Vec<(String, String)>,
    message: String,
}

impl DeployRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value in place, or append the key after the existing headers.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((key, value)),
        }
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn commit(&self) -> Option<CommitId> {
        self.get(KEY_COMMIT).map(CommitId::new)
    }

    pub fn tag(&self) -> Option<&str> {
        self.get(KEY_TAG)
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut record = DeployRecord::new();
        let mut lines = text.split_inclusive('\n').enumerate();

        for (idx, raw) in lines.by_ref() {
            let line = raw.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(ParseError {
                    line: idx + 1,
                    reason: format!("expected `key: value`, found {:?}", line),
                });
            };
            let key = key.trim();
            if key.is_empty() || key.contains(char::is_whitespace) {
                return Err(ParseError {
                    line: idx + 1,
                    reason: format!("invalid key {:?}", key),
                });
            }
            record.set(key, value.trim_start());
        }

        record.message = lines.map(|(_, l)| l).collect();
        Ok(record)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.headers {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.message);
        if !self.message.is_empty() && !self.message.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for DeployRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Reads and writes the deploy record file of one deployment root.
#[derive(Debug, Clone)]
pub struct DeployFileStore {
    path: PathBuf,
}

impl DeployFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Configured path (relative to `root`), else `lib/.deploy` when `lib/` exists, else `.deploy`.
    pub fn resolve(root: &Path, configured: Option<&Path>) -> Self {
        let path = match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => root.join(path),
            None if root.join("lib").is_dir() => root.join("lib").join(".deploy"),
            None => root.join(".deploy"),
        };
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<DeployRecord, RecordError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RecordError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(RecordError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        DeployRecord::parse(&text).map_err(|e| RecordError::Malformed {
            path: self.path.clone(),
            line: e.line,
            reason: e.reason,
        })
    }

    pub fn write(&self, record: &DeployRecord) -> Result<(), RecordError> {
        let io_err = |source| RecordError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.path, record.render()).map_err(io_err)?;
        tracing::debug!("wrote deploy record to {}", self.path.display());
        Ok(())
    }

    /// The record, only if it describes `head`. Missing files yield `None`.
    pub fn read_if_current(&self, head: &CommitId) -> Result<Option<DeployRecord>, RecordError> {
        match self.read() {
            Ok(record) if record.commit().as_ref() == Some(head) => Ok(Some(record)),
            Ok(_) | Err(RecordError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_order_and_message() {
        let text = "commit: abc123\ntag: sheep-20080825-2105\ndeployed-by: alice\n\nfix the frobnicator\nsecond line\n";
        let record = DeployRecord::parse(text).unwrap();
        let keys: Vec<_> = record.headers().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["commit", "tag", "deployed-by"]);
        assert_eq!(record.tag(), Some("sheep-20080825-2105"));
        assert_eq!(record.message(), "fix the frobnicator\nsecond line\n");
    }

    #[test]
    fn values_may_contain_colons() {
        let record = DeployRecord::parse("deploy-date: 2008-08-25 21:05:00\n\n").unwrap();
        assert_eq!(record.get(KEY_DEPLOY_DATE), Some("2008-08-25 21:05:00"));
    }

    #[test]
    fn set_appends_before_blank_line() {
        let mut record = DeployRecord::parse("commit: abc\ntag: t1\n\nmsg\n").unwrap();
        record.set(KEY_DEPLOYED_BY, "alice");
        record.set(KEY_COMMIT, "def");
        assert_eq!(
            record.render(),
            "commit: def\ntag: t1\ndeployed-by: alice\n\nmsg\n"
        );
    }

    #[test]
    fn header_without_colon_is_malformed() {
        let err = DeployRecord::parse("commit abc\n\n").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn headers_only_file_parses() {
        let record = DeployRecord::parse("commit: abc\n").unwrap();
        assert_eq!(record.get("commit"), Some("abc"));
        assert_eq!(record.message(), "");
    }

    #[test]
    fn store_path_prefers_lib_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            DeployFileStore::resolve(dir.path(), None).path(),
            dir.path().join(".deploy")
        );
        fs::create_dir(dir.path().join("lib")).unwrap();
        assert_eq!(
            DeployFileStore::resolve(dir.path(), None).path(),
            dir.path().join("lib/.deploy")
        );
        assert_eq!(
            DeployFileStore::resolve(dir.path(), Some(Path::new("etc/deploy"))).path(),
            dir.path().join("etc/deploy")
        );
    }

    #[test]
    fn read_if_current_checks_head() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeployFileStore::resolve(dir.path(), None);
        assert!(matches!(store.read(), Err(RecordError::NotFound(_))));
        assert!(store.read_if_current(&CommitId::new("abc")).unwrap().is_none());

        let mut record = DeployRecord::new();
        record.set(KEY_COMMIT, "abc");
        record.set_message("hello");
        store.write(&record).unwrap();

        assert_eq!(
            store.read_if_current(&CommitId::new("abc")).unwrap(),
            Some(DeployRecord::parse("commit: abc\n\nhello\n").unwrap())
        );
        assert!(store.read_if_current(&CommitId::new("def")).unwrap().is_none());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeployFileStore::resolve(dir.path(), None);
        fs::write(store.path(), "garbage\n").unwrap();
        let err = store.read().unwrap_err();
        assert!(matches!(err, RecordError::Malformed { line: 1, .. }));
        assert!(err.to_string().contains(".deploy"));
    }
}
