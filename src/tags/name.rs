// ABOUTME: Tag name formatting and parsing for `<prefix>-<date>[-<n>]` names.
// ABOUTME: Dates use a chrono strftime pattern; `-<n>` disambiguates same-minute tags.

use std::fmt::Write;

use chrono::format::{Item, Numeric, Parsed, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime};

use super::TagError;
use crate::types::{EnvName, TagName};

/// Default date pattern, e.g. `sheep-20080825-2105`.
pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d-%H%M";

/// Characters git refuses in ref names, plus whitespace.
const FORBIDDEN_IN_REF: &[char] = &[' ', '\t', ':', '~', '^', '?', '*', '[', '\\'];

/// Date and disambiguator recovered from a tag name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTagName {
    pub date: NaiveDateTime,
    /// 0 for the first tag of a minute, `n` for a `-<n>` suffix.
    pub seq: u32,
}

/// Check that `format` is a valid strftime pattern producing ref-safe text.
pub fn validate_date_format(format: &str) -> Result<(), TagError> {
    let invalid = |reason: &str| TagError::InvalidDateFormat {
        format: format.to_string(),
        reason: reason.to_string(),
    };

    if format.is_empty() {
        return Err(invalid("pattern is empty"));
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(invalid("unknown strftime specifier"));
    }
    if format.contains("%n") || format.contains("%t") {
        return Err(invalid("whitespace specifiers are not allowed in tag names"));
    }
    if let Some(c) = format.chars().find(|c| FORBIDDEN_IN_REF.contains(c)) {
        return Err(invalid(&format!("character {c:?} is not allowed in tag names")));
    }
    let mut sample = String::new();
    if let Some(dt) = NaiveDate::from_ymd_opt(2008, 8, 25).and_then(|d| d.and_hms_opt(21, 5, 0))
        && write!(sample, "{}", dt.format(format)).is_err()
    {
        return Err(invalid("time zone specifiers cannot be rendered for local tag dates"));
    }
    if let Some(c) = sample.chars().find(|c| FORBIDDEN_IN_REF.contains(c)) {
        return Err(invalid(&format!("expands to {c:?}, which is not allowed in tag names")));
    }
    Ok(())
}

/// Build a tag name. `seq == 0` yields the plain name.
///
/// `format` must have passed [`validate_date_format`]; chrono panics while
/// rendering an invalid pattern.
pub fn format_tag_name(prefix: &EnvName, format: &str, now: NaiveDateTime, seq: u32) -> TagName {
    let stamp = now.format(format);
    if seq == 0 {
        TagName::new(format!("{prefix}-{stamp}"))
    } else {
        TagName::new(format!("{prefix}-{stamp}-{seq}"))
    }
}

/// Recover the embedded date of a tag belonging to `prefix`.
///
/// Returns `None` for names of other prefixes and for names whose date part
/// does not match `format`.
pub fn parse_tag_name(name: &str, prefix: &str, format: &str) -> Option<ParsedTagName> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;

    if let Some(date) = parse_stamp(rest, format) {
        return Some(ParsedTagName { date, seq: 0 });
    }

    let (stamp, suffix) = rest.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let seq = suffix.parse().ok()?;
    parse_stamp(stamp, format).map(|date| ParsedTagName { date, seq })
}

fn parse_stamp(stamp: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(date) = NaiveDateTime::parse_from_str(stamp, format) {
        return Some(date);
    }

    let fields: Vec<Numeric> = StrftimeItems::new(format)
        .filter_map(|item| match item {
            Item::Numeric(field, _) => Some(field),
            _ => None,
        })
        .collect();
    let mut parsed = Parsed::new();
    chrono::format::parse(&mut parsed, stamp, StrftimeItems::new(format)).ok()?;
    let date = parsed.to_naive_date().ok()?;

    if !fields.iter().any(|f| matches!(f, Numeric::Hour | Numeric::Hour12)) {
        return date.and_hms_opt(0, 0, 0);
    }
    // Coarser patterns such as `%Y%m%d-%H` leave the lower fields at zero.
    if !fields.contains(&Numeric::Minute) {
        parsed.set_minute(0).ok()?;
    }
    if !fields.contains(&Numeric::Second) {
        parsed.set_second(0).ok()?;
    }
    parsed.to_naive_time().ok().map(|time| date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn formats_plain_and_suffixed_names() {
        let env = EnvName::new("sheep").unwrap();
        let now = at(2008, 8, 25, 21, 5);
        assert_eq!(
            format_tag_name(&env, DEFAULT_DATE_FORMAT, now, 0).as_str(),
            "sheep-20080825-2105"
        );
        assert_eq!(
            format_tag_name(&env, DEFAULT_DATE_FORMAT, now, 2).as_str(),
            "sheep-20080825-2105-2"
        );
    }

    #[test]
    fn parses_plain_name() {
        let parsed = parse_tag_name("sheep-20080825-2116", "sheep", DEFAULT_DATE_FORMAT).unwrap();
        assert_eq!(parsed.date, at(2008, 8, 25, 21, 16));
        assert_eq!(parsed.seq, 0);
    }

    #[test]
    fn parses_disambiguated_name() {
        let parsed =
            parse_tag_name("sheep-20080825-2116-12", "sheep", DEFAULT_DATE_FORMAT).unwrap();
        assert_eq!(parsed.date, at(2008, 8, 25, 21, 16));
        assert_eq!(parsed.seq, 12);
    }

    #[test]
    fn rejects_other_prefixes_and_garbage() {
        assert!(parse_tag_name("goat-20080825-2116", "sheep", DEFAULT_DATE_FORMAT).is_none());
        assert!(parse_tag_name("sheep-dip-20080825-2116", "sheep", DEFAULT_DATE_FORMAT).is_none());
        assert!(parse_tag_name("sheep-latest", "sheep", DEFAULT_DATE_FORMAT).is_none());
        assert!(parse_tag_name("sheep", "sheep", DEFAULT_DATE_FORMAT).is_none());
    }

    #[test]
    fn date_only_format_parses_at_midnight() {
        let parsed = parse_tag_name("sheep-20080826", "sheep", "%Y%m%d").unwrap();
        assert_eq!(parsed.date, at(2008, 8, 26, 0, 0));
    }

    #[test]
    fn hour_only_format_keeps_the_hour() {
        let parsed = parse_tag_name("sheep-20080825-21", "sheep", "%Y%m%d-%H").unwrap();
        assert_eq!(parsed.date, at(2008, 8, 25, 21, 0));

        let parsed = parse_tag_name("sheep-20080825-21-3", "sheep", "%Y%m%d-%H").unwrap();
        assert_eq!(parsed.date, at(2008, 8, 25, 21, 0));
        assert_eq!(parsed.seq, 3);
    }

    #[test]
    fn time_zone_specifiers_are_rejected() {
        for format in ["%Y%m%d-%H%M%z", "%Y%m%d-%Z"] {
            let err = validate_date_format(format).unwrap_err();
            assert!(err.to_string().contains("time zone"), "{format}: {err}");
        }
    }

    #[test]
    fn validates_formats() {
        assert!(validate_date_format(DEFAULT_DATE_FORMAT).is_ok());
        assert!(validate_date_format("%Y.%m.%d_%H%M%S").is_ok());
        assert!(validate_date_format("").is_err());
        assert!(validate_date_format("%Y %m").is_err());
        assert!(validate_date_format("%H:%M").is_err());
        assert!(validate_date_format("%Q").is_err());
        // %c expands to text containing spaces and colons.
        assert!(validate_date_format("%c").is_err());
    }
}
