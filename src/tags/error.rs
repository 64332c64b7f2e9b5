// ABOUTME: Error types for tag repository operations.
// ABOUTME: Covers date format problems, missing tags and adapter failures.

use crate::vcs::VcsError;

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    /// The configured strftime pattern cannot produce a valid tag name.
    #[error("invalid tag date format {format:?}: {reason}")]
    InvalidDateFormat { format: String, reason: String },

    /// No rollout tag with the requested name exists for the prefix.
    #[error("no rollout tag named {name:?} for {prefix} (see `rollout log`)")]
    NoMatchingTag { prefix: String, name: String },

    /// Every disambiguated name for this minute is taken.
    #[error("could not find a free tag name starting with {0}")]
    NameCollision(String),

    #[error(transparent)]
    Vcs(#[from] VcsError),
}
