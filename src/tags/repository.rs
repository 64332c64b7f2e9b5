// ABOUTME: TagRepository lists, groups and creates rollout tags through the Vcs adapter.
// ABOUTME: Duplicate detection marks the oldest tag of each commit as canonical.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

use super::name::{format_tag_name, parse_tag_name, validate_date_format};
use super::record::{RefKind, TagRecord};
use super::TagError;
use crate::types::{CommitId, EnvName, TagName};
use crate::vcs::{RawTag, Vcs};

/// Historical floor below which tags are never listed: 2000-01-01.
pub const DEFAULT_CUTOFF: (i32, u32, u32) = (2000, 1, 1);

/// Upper bound on `-<n>` suffixes tried for a single minute.
const MAX_DISAMBIGUATOR: u32 = 999;

pub fn default_cutoff() -> NaiveDate {
    let (y, m, d) = DEFAULT_CUTOFF;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
}

/// Parameters of a history listing.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub prefix: EnvName,
    /// Tags dated before this day are dropped; the day itself is kept.
    pub cutoff: NaiveDate,
    /// Also list branch heads (and tags whose name carries no date).
    pub include_branches: bool,
    /// Show full commit hashes instead of abbreviated ones.
    pub long_digest: bool,
}

impl ListOptions {
    pub fn new(prefix: EnvName) -> Self {
        Self {
            prefix,
            cutoff: default_cutoff(),
            include_branches: false,
            long_digest: false,
        }
    }
}

/// Rollout tags of a repository.
pub struct TagRepository<'a, V: Vcs + ?Sized> {
    vcs: &'a V,
    date_format: String,
    remote: bool,
}

impl<'a, V: Vcs + ?Sized> TagRepository<'a, V> {
    /// `remote == false` never touches the network (no fetch, no push).
    pub fn new(vcs: &'a V, date_format: &str, remote: bool) -> Result<Self, TagError> {
        validate_date_format(date_format)?;
        Ok(Self {
            vcs,
            date_format: date_format.to_string(),
            remote,
        })
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Cut an annotated tag at HEAD named after `now`.
    ///
    /// A name already taken (by any commit) gets the first free `-<n>`
    /// suffix. The tag is pushed only when `push` is set and remote access is
    /// enabled.
    pub async fn create_tag(
        &self,
        prefix: &EnvName,
        message: &str,
        now: NaiveDateTime,
        push: bool,
    ) -> Result<TagRecord, TagError> {
        if self.remote {
            self.vcs.fetch_tags().await?;
        }

        let head = self.vcs.current_commit().await?;
        let taken: HashSet<String> = self
            .vcs
            .list_tags(&prefix.tag_pattern())
            .await?
            .into_iter()
            .map(|t| t.name.into_inner())
            .collect();

        let (name, seq) = self.free_name(prefix, now, &taken)?;

        tracing::info!("Creating tag {} at {}", name, head.short());
        self.vcs.create_annotated_tag(&name, message, &head).await?;

        if push && self.remote {
            tracing::info!("Pushing tag {}", name);
            self.vcs.push(&format!("refs/tags/{name}")).await?;
        }

        let date = parse_tag_name(name.as_str(), prefix.as_str(), &self.date_format)
            .map(|p| p.date)
            .unwrap_or(now);

        Ok(TagRecord {
            name,
            kind: RefKind::Tag,
            prefix: prefix.to_string(),
            date: Some(date),
            seq,
            digest: head.short().to_string(),
            target: head,
            message: message.to_string(),
            duplicate_of: None,
            is_head: true,
        })
    }

    fn free_name(
        &self,
        prefix: &EnvName,
        now: NaiveDateTime,
        taken: &HashSet<String>,
    ) -> Result<(TagName, u32), TagError> {
        for seq in 0..=MAX_DISAMBIGUATOR {
            let candidate = format_tag_name(prefix, &self.date_format, now, seq);
            if !taken.contains(candidate.as_str()) {
                if seq > 0 {
                    tracing::debug!("Tag name collision, using {}", candidate);
                }
                return Ok((candidate, seq));
            }
        }
        Err(TagError::NameCollision(
            format_tag_name(prefix, &self.date_format, now, 0).into_inner(),
        ))
    }

    /// History listing for a prefix, newest first.
    pub async fn list_tags(&self, opts: &ListOptions) -> Result<Vec<TagRecord>, TagError> {
        if self.remote {
            self.vcs.fetch_tags().await?;
        }

        let head = self.vcs.current_commit().await?;
        let raw = self.vcs.list_tags(&opts.prefix.tag_pattern()).await?;

        let mut records: Vec<TagRecord> = raw
            .into_iter()
            .filter_map(|tag| self.to_record(tag, opts, &head))
            .collect();

        mark_duplicates(&mut records);

        if opts.include_branches {
            for branch in self.vcs.list_branches().await? {
                records.push(TagRecord {
                    name: TagName::new(branch.name),
                    kind: RefKind::Branch,
                    prefix: opts.prefix.to_string(),
                    date: None,
                    seq: 0,
                    digest: digest(&branch.target, opts.long_digest),
                    is_head: branch.target == head,
                    target: branch.target,
                    message: String::new(),
                    duplicate_of: None,
                });
            }
        }

        records.sort_by(|a, b| a.rank().cmp(&b.rank()));
        Ok(records)
    }

    fn to_record(&self, tag: RawTag, opts: &ListOptions, head: &CommitId) -> Option<TagRecord> {
        let parsed = parse_tag_name(tag.name.as_str(), opts.prefix.as_str(), &self.date_format);

        match parsed {
            Some(p) if p.date.date() < opts.cutoff => return None,
            None if !opts.include_branches => {
                tracing::debug!("Skipping undated tag {}", tag.name);
                return None;
            }
            _ => {}
        }

        Some(TagRecord {
            kind: RefKind::Tag,
            prefix: opts.prefix.to_string(),
            date: parsed.map(|p| p.date),
            seq: parsed.map(|p| p.seq).unwrap_or(0),
            digest: digest(&tag.target, opts.long_digest),
            is_head: &tag.target == head,
            name: tag.name,
            target: tag.target,
            message: tag.message,
            duplicate_of: None,
        })
    }

    /// Revert menu entries: newest first, one name per target commit.
    pub async fn revert_candidates(
        &self,
        prefix: &EnvName,
        limit: usize,
    ) -> Result<Vec<TagRecord>, TagError> {
        let listing = self.list_tags(&ListOptions::new(prefix.clone())).await?;
        let mut offered = HashSet::new();
        Ok(listing
            .into_iter()
            .filter(|t| t.kind == RefKind::Tag && t.date.is_some())
            .filter(|t| offered.insert(t.target.clone()))
            .take(limit)
            .collect())
    }

    /// Tags of `prefix` pointing at HEAD, newest first.
    pub async fn tags_at_head(&self, opts: &ListOptions) -> Result<Vec<TagRecord>, TagError> {
        Ok(self
            .list_tags(opts)
            .await?
            .into_iter()
            .filter(|t| t.kind == RefKind::Tag && t.is_head)
            .collect())
    }

    /// Most recent dated tag of `prefix`.
    pub async fn latest(&self, prefix: &EnvName) -> Result<Option<TagRecord>, TagError> {
        Ok(self
            .list_tags(&ListOptions::new(prefix.clone()))
            .await?
            .into_iter()
            .next())
    }

    /// Look a tag of `prefix` up by name.
    pub async fn find(&self, prefix: &EnvName, name: &str) -> Result<TagRecord, TagError> {
        let mut opts = ListOptions::new(prefix.clone());
        opts.cutoff = NaiveDate::MIN;
        self.list_tags(&opts)
            .await?
            .into_iter()
            .find(|t| t.name.as_str() == name)
            .ok_or_else(|| TagError::NoMatchingTag {
                prefix: prefix.to_string(),
                name: name.to_string(),
            })
    }
}

fn digest(commit: &CommitId, long: bool) -> String {
    if long {
        commit.to_string()
    } else {
        commit.short().to_string()
    }
}

/// Point every dated tag at the oldest dated tag sharing its commit.
fn mark_duplicates(records: &mut [TagRecord]) {
    let mut canonical: HashMap<CommitId, usize> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        if record.date.is_none() {
            continue;
        }
        canonical
            .entry(record.target.clone())
            .and_modify(|best| {
                // The oldest entry ranks last.
                if record.rank() > records[*best].rank() {
                    *best = idx;
                }
            })
            .or_insert(idx);
    }

    let names: HashMap<CommitId, TagName> = canonical
        .into_iter()
        .map(|(commit, idx)| (commit, records[idx].name.clone()))
        .collect();

    for record in records.iter_mut().filter(|r| r.date.is_some()) {
        if let Some(oldest) = names.get(&record.target)
            && *oldest != record.name
        {
            record.duplicate_of = Some(oldest.clone());
        }
    }
}
