// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent commit/tag confusion at compile time.

mod env_name;
mod id;

pub use env_name::{EnvName, EnvNameError};
pub use id::{CommitId, Id, SHORT_DIGEST_LEN, TagName};
