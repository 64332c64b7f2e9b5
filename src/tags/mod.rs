// ABOUTME: Rollout tag history: naming, date parsing, duplicate grouping and ordering.
// ABOUTME: Wraps the Vcs adapter to list, create and select rollout tags.

mod error;
mod name;
mod rank;
mod record;
mod repository;

pub use error::TagError;
pub use name::{
    DEFAULT_DATE_FORMAT, ParsedTagName, format_tag_name, parse_tag_name, validate_date_format,
};
pub use rank::{Rank, SENTINEL_BRANCHES, is_sentinel};
pub use record::{RefKind, TagRecord};
pub use repository::{DEFAULT_CUTOFF, ListOptions, TagRepository, default_cutoff};
