// ABOUTME: TagRecord, one entry of the rollout history listing.
// ABOUTME: Renders the `* name digest -> canonical` listing line.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::rank::Rank;
use crate::types::{CommitId, TagName};

/// What kind of ref a listing entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Tag,
    Branch,
}

/// A rollout tag (or, when requested, a branch head) in the history listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRecord {
    pub name: TagName,
    pub kind: RefKind,
    /// Environment prefix the entry was listed under.
    pub prefix: String,
    /// Date embedded in the name; `None` for branches and unparsable names.
    pub date: Option<NaiveDateTime>,
    pub seq: u32,
    pub target: CommitId,
    /// Abbreviated or full commit hash, as requested by the listing.
    pub digest: String,
    pub message: String,
    /// Oldest tag pointing at the same commit, when this one is not it.
    pub duplicate_of: Option<TagName>,
    /// Whether `target` is the commit currently checked out.
    pub is_head: bool,
}

impl TagRecord {
    pub fn rank(&self) -> Rank<'_> {
        Rank::new(self.date, self.seq, self.name.as_str())
    }

    pub fn is_canonical(&self) -> bool {
        self.duplicate_of.is_none()
    }

    /// First line of the annotation.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

impl fmt::Display for TagRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.is_head { '*' } else { ' ' };
        write!(f, "{marker} {} {}", self.name, self.digest)?;
        if let Some(canonical) = &self.duplicate_of {
            write!(f, " -> {canonical}")?;
        }
        Ok(())
    }
}
