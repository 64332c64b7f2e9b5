// ABOUTME: Custom serde deserializers for config values.
// ABOUTME: Accepts umasks and cutoff dates written either as strings or as bare YAML numbers.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::deploy::parse_umask;

/// YAML turns `umask: 0002` into the integer 2, so numbers are read back as octal digits.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(u64),
}

impl StringOrNumber {
    fn into_text(self) -> String {
        match self {
            StringOrNumber::String(s) => s,
            StringOrNumber::Number(n) => n.to_string(),
        }
    }
}

pub fn deserialize_umask<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(value) = Option::<StringOrNumber>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let text = value.into_text();
    parse_umask(&text)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid umask {text:?}: expected octal like 0002")))
}

pub fn deserialize_cutoff<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(value) = Option::<StringOrNumber>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let text = value.into_text();
    parse_cutoff(&text).map(Some).map_err(serde::de::Error::custom)
}

/// Parse a `YYYYMMDD` cutoff date.
pub fn parse_cutoff(text: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(text.trim(), "%Y%m%d")
        .map_err(|e| format!("invalid date {text:?}: expected YYYYMMDD ({e})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "deserialize_umask")]
        umask: Option<u32>,
        #[serde(default, deserialize_with = "deserialize_cutoff")]
        cutoff: Option<NaiveDate>,
    }

    #[test]
    fn umask_from_string_or_number() {
        let probe: Probe = serde_yaml::from_str("umask: \"0022\"").unwrap();
        assert_eq!(probe.umask, Some(0o022));
        let probe: Probe = serde_yaml::from_str("umask: 2").unwrap();
        assert_eq!(probe.umask, Some(0o002));
        assert!(serde_yaml::from_str::<Probe>("umask: \"9\"").is_err());
    }

    #[test]
    fn cutoff_from_string_or_number() {
        let expected = NaiveDate::from_ymd_opt(2008, 8, 26);
        let probe: Probe = serde_yaml::from_str("cutoff: 20080826").unwrap();
        assert_eq!(probe.cutoff, expected);
        let probe: Probe = serde_yaml::from_str("cutoff: \"20080826\"").unwrap();
        assert_eq!(probe.cutoff, expected);
        assert!(serde_yaml::from_str::<Probe>("cutoff: 2008-08-26").is_err());
    }
}
