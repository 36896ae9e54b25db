//! Data source names: `<repository-path>[?<key>=<value>&...]`.
//!
//! Recognized keys (case-insensitive) are `timezone`, `datetimeformat` and `ansiquotes`.
//! A key given without `=` keeps its default. Values run up to the next `&` that begins
//! another key, so a `datetimeformat` value may itself contain `?`, `=` and `&`.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CsvMiddlewareError;

pub const DEFAULT_TIMEZONE: &str = "Local";

static NEXT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:[A-Za-z_][A-Za-z0-9_]*)?(?:=|&|$)").unwrap_or_else(|e| {
        unreachable!("static pattern: {e}")
    })
});

/// Parsed connection locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    repository: String,
    timezone: String,
    datetime_format: String,
    ansi_quotes: bool,
}

impl Dsn {
    /// A locator for `repository` with every option at its default.
    #[must_use]
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            datetime_format: String::new(),
            ansi_quotes: false,
        }
    }

    /// # Errors
    ///
    /// Returns [`CsvMiddlewareError::InvalidDsn`] for unknown keys and for an `ansiquotes`
    /// value that is not a boolean.
    pub fn parse(dsn: &str) -> Result<Self, CsvMiddlewareError> {
        let (repository, query) = match dsn.split_once('?') {
            Some((repository, query)) => (repository, query),
            None => (dsn, ""),
        };
        let mut parsed = Dsn::new(repository);

        let mut rest = query;
        while !rest.is_empty() {
            let key_end = rest.find(['=', '&']).unwrap_or(rest.len());
            let key = &rest[..key_end];
            let after = &rest[key_end..];
            let (value, remaining) = match after.strip_prefix('=') {
                Some(body) => {
                    let end = value_end(body);
                    (Some(&body[..end]), &body[end..])
                }
                None => (None, after),
            };
            rest = remaining.strip_prefix('&').unwrap_or(remaining);

            if key.is_empty() {
                if value.is_some() {
                    return Err(CsvMiddlewareError::InvalidDsn(format!(
                        "parameter without a name in {dsn:?}"
                    )));
                }
                continue;
            }
            parsed.apply(key, value)?;
        }
        Ok(parsed)
    }

    fn apply(&mut self, key: &str, value: Option<&str>) -> Result<(), CsvMiddlewareError> {
        match key.to_ascii_lowercase().as_str() {
            "timezone" => {
                if let Some(v) = value.filter(|v| !v.is_empty()) {
                    self.timezone = v.to_string();
                }
            }
            "datetimeformat" => {
                if let Some(v) = value {
                    self.datetime_format = v.to_string();
                }
            }
            "ansiquotes" => {
                if let Some(v) = value {
                    self.ansi_quotes = parse_bool(v).ok_or_else(|| {
                        CsvMiddlewareError::InvalidDsn(format!(
                            "ansiquotes value {v:?} is not a boolean"
                        ))
                    })?;
                }
            }
            _ => {
                return Err(CsvMiddlewareError::InvalidDsn(format!(
                    "unknown parameter {key:?}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    #[must_use]
    pub fn datetime_format(&self) -> &str {
        &self.datetime_format
    }

    #[must_use]
    pub fn ansi_quotes(&self) -> bool {
        self.ansi_quotes
    }
}

impl FromStr for Dsn {
    type Err = CsvMiddlewareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dsn::parse(s)
    }
}

fn value_end(body: &str) -> usize {
    body.match_indices('&')
        .map(|(i, _)| i)
        .find(|&i| NEXT_KEY.is_match(&body[i..]))
        .unwrap_or(body.len())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dsn(repository: &str, timezone: &str, datetime_format: &str, ansi_quotes: bool) -> Dsn {
        Dsn {
            repository: repository.to_string(),
            timezone: timezone.to_string(),
            datetime_format: datetime_format.to_string(),
            ansi_quotes,
        }
    }

    #[test]
    fn parses_locators() {
        let cases = [
            (
                "/path/to/data/directory",
                dsn("/path/to/data/directory", "Local", "", false),
            ),
            (
                "/path/to/data/directory?",
                dsn("/path/to/data/directory", "Local", "", false),
            ),
            (
                "/path/to/data/directory?Timezone=UTC&DatetimeFormat=[\"%d%m%Y\"]&AnsiQuotes=true",
                dsn("/path/to/data/directory", "UTC", "[\"%d%m%Y\"]", true),
            ),
            (
                "/path/to/data/directory?timezone=UTC&datetimeformat=[\"%d%m%Y\"]&ansiquotes=true",
                dsn("/path/to/data/directory", "UTC", "[\"%d%m%Y\"]", true),
            ),
            (
                "/path/to/data/directory?datetimeformat=[\"?%d%m\\\"%Y=&\"]",
                dsn("/path/to/data/directory", "Local", "[\"?%d%m\\\"%Y=&\"]", false),
            ),
            (
                "/path/to/data/directory?timezone&datetimeformat&ansiquotes",
                dsn("/path/to/data/directory", "Local", "", false),
            ),
            (
                "/path/to/data/directory?timezone&datetimeformat&ansiquotes=true&",
                dsn("/path/to/data/directory", "Local", "", true),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(Dsn::parse(input).unwrap(), expected, "{input}");
        }
    }

    #[test]
    fn rejects_bad_booleans_and_unknown_keys() {
        for input in [
            "/path/to/data/directory?timezone&datetimeformat&ansiquotes=err&",
            "/path/to/data/directory?Timezone=UTC&IncorrectParam=true",
        ] {
            let err = Dsn::parse(input).unwrap_err();
            assert!(matches!(err, CsvMiddlewareError::InvalidDsn(_)), "{input}");
        }
    }

    #[test]
    fn empty_segments_are_ignored() {
        let parsed: Dsn = "data?&&timezone=+09:00&&".parse().unwrap();
        assert_eq!(parsed.repository(), "data");
        assert_eq!(parsed.timezone(), "+09:00");
    }
}
