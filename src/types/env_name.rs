// ABOUTME: Validated environment name used as the rollout tag prefix.
// ABOUTME: Restricts names to characters that are safe in git ref names and glob patterns.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvNameError {
    #[error("environment name cannot be empty")]
    Empty,

    #[error("environment name exceeds maximum length of 64 characters")]
    TooLong,

    #[error("environment name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("environment name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in environment name: '{0}'")]
    InvalidChar(char),
}

/// Name of a deployment target. Doubles as the prefix of every rollout tag
/// cut for it, so it must be usable inside `refs/tags/<name>-*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvName(String);

impl EnvName {
    pub fn new(value: &str) -> Result<Self, EnvNameError> {
        if value.is_empty() {
            return Err(EnvNameError::Empty);
        }

        if value.len() > 64 {
            return Err(EnvNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(EnvNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(EnvNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' && c != '.' {
                return Err(EnvNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Glob matching every tag cut for this environment.
    pub fn tag_pattern(&self) -> String {
        format!("{}-*", self.0)
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EnvName {
    type Err = EnvNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for EnvName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EnvName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EnvName::new(&s).map_err(serde::de::Error::custom)
    }
}
