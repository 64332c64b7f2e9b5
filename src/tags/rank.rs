// ABOUTME: Pure ordering policy for rollout listings.
// ABOUTME: Dated tags newest first, then undated refs with trunk-like branches leading.

use std::cmp::Ordering;

use chrono::NaiveDateTime;

/// Branch names listed before any other undated ref.
pub const SENTINEL_BRANCHES: &[&str] = &["main", "master", "trunk"];

pub fn is_sentinel(name: &str) -> bool {
    SENTINEL_BRANCHES.contains(&name)
}

/// Sort key of one listing entry. `Ordering::Less` means "listed earlier".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rank<'a> {
    pub date: Option<NaiveDateTime>,
    /// Same-minute disambiguator; higher was created later.
    pub seq: u32,
    pub sentinel: bool,
    pub name: &'a str,
}

impl<'a> Rank<'a> {
    pub fn new(date: Option<NaiveDateTime>, seq: u32, name: &'a str) -> Self {
        Self {
            date,
            seq,
            sentinel: date.is_none() && is_sentinel(name),
            name,
        }
    }

    pub fn has_date(&self) -> bool {
        self.date.is_some()
    }
}

impl Ord for Rank<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.date, other.date) {
            (Some(a), Some(b)) => b
                .cmp(&a)
                .then_with(|| other.seq.cmp(&self.seq))
                .then_with(|| other.name.cmp(self.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => other
                .sentinel
                .cmp(&self.sentinel)
                .then_with(|| self.name.cmp(other.name)),
        }
    }
}

impl PartialOrd for Rank<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
