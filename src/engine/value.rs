use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone};

use super::execution::Location;

/// Three-valued logic used by comparisons and `WHERE` evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    False,
    Unknown,
    True,
}

impl Ternary {
    #[must_use]
    pub fn from_bool(b: bool) -> Self {
        if b { Ternary::True } else { Ternary::False }
    }

    /// `None` when the value is indeterminate.
    #[must_use]
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Ternary::True => Some(true),
            Ternary::False => Some(false),
            Ternary::Unknown => None,
        }
    }

    #[must_use]
    pub fn and(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::False, _) | (_, Ternary::False) => Ternary::False,
            (Ternary::True, Ternary::True) => Ternary::True,
            _ => Ternary::Unknown,
        }
    }

    #[must_use]
    pub fn or(self, other: Ternary) -> Ternary {
        match (self, other) {
            (Ternary::True, _) | (_, Ternary::True) => Ternary::True,
            (Ternary::False, Ternary::False) => Ternary::False,
            _ => Ternary::Unknown,
        }
    }

    #[must_use]
    pub fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }
}

impl fmt::Display for Ternary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Ternary::True => "TRUE",
            Ternary::False => "FALSE",
            Ternary::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Typed value produced and consumed by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Ternary(Ternary),
    Datetime(DateTime<FixedOffset>),
    Null,
}

const DEFAULT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

const DEFAULT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer projection used by `INTEGER()` and numeric comparison.
    #[must_use]
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => float_to_integer(*f),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_integer))
            }
            Value::Boolean(_) | Value::Ternary(_) | Value::Datetime(_) | Value::Null => None,
        }
    }

    #[must_use]
    pub fn to_float(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Boolean(_) | Value::Ternary(_) | Value::Datetime(_) | Value::Null => None,
        }
    }

    #[must_use]
    pub fn to_ternary(&self) -> Ternary {
        match self {
            Value::Boolean(b) => Ternary::from_bool(*b),
            Value::Ternary(t) => *t,
            Value::Integer(1) => Ternary::True,
            Value::Integer(0) => Ternary::False,
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ternary::True,
                "false" | "0" => Ternary::False,
                _ => Ternary::Unknown,
            },
            Value::Integer(_) | Value::Float(_) | Value::Datetime(_) | Value::Null => {
                Ternary::Unknown
            }
        }
    }

    /// Datetime projection; strings are tried against `formats` first, then common layouts.
    #[must_use]
    pub fn to_datetime(&self, formats: &[String], location: &Location) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Datetime(dt) => Some(*dt),
            Value::String(s) => parse_datetime(s.trim(), formats, location),
            Value::Integer(secs) => location.offset().timestamp_opt(*secs, 0).single(),
            _ => None,
        }
    }

    /// Textual projection; `None` for NULL.
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Ternary(t) => Some(t.to_string()),
            Value::Datetime(dt) => Some(dt.to_rfc3339()),
            Value::Null => None,
        }
    }

    /// Field text written back to a CSV file.
    #[must_use]
    pub fn to_field(&self) -> String {
        self.to_text().unwrap_or_default()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_integer(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_datetime(s: &str, formats: &[String], location: &Location) -> Option<DateTime<FixedOffset>> {
    if s.is_empty() {
        return None;
    }
    for fmt in formats {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return location.localize(naive);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).and_then(|n| location.localize(n));
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in DEFAULT_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return location.localize(naive);
        }
    }
    for fmt in DEFAULT_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).and_then(|n| location.localize(n));
        }
    }
    None
}

/// Compare two values the way `=`, `<` and friends do.
///
/// Returns `None` when either side is NULL or the pair is not comparable.
pub(crate) fn compare(
    left: &Value,
    right: &Value,
    formats: &[String],
    location: &Location,
) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    if let (Some(l), Some(r)) = (left.to_integer(), right.to_integer())
        && !matches!(left, Value::Float(_))
        && !matches!(right, Value::Float(_))
    {
        return Some(l.cmp(&r));
    }
    if let (Some(l), Some(r)) = (left.to_float(), right.to_float()) {
        return l.partial_cmp(&r);
    }
    if matches!(left, Value::Datetime(_)) || matches!(right, Value::Datetime(_)) {
        let l = left.to_datetime(formats, location)?;
        let r = right.to_datetime(formats, location)?;
        return Some(l.cmp(&r));
    }
    if matches!(left, Value::Boolean(_) | Value::Ternary(_))
        || matches!(right, Value::Boolean(_) | Value::Ternary(_))
    {
        let l = left.to_ternary().as_bool()?;
        let r = right.to_ternary().as_bool()?;
        return Some(l.cmp(&r));
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ternary_logic_follows_kleene() {
        assert_eq!(Ternary::True.and(Ternary::Unknown), Ternary::Unknown);
        assert_eq!(Ternary::False.and(Ternary::Unknown), Ternary::False);
        assert_eq!(Ternary::True.or(Ternary::Unknown), Ternary::True);
        assert_eq!(Ternary::Unknown.not(), Ternary::Unknown);
    }

    #[test]
    fn numeric_strings_compare_with_integers() {
        let loc = Location::Utc;
        let ord = compare(&Value::String("2".into()), &Value::Integer(2), &[], &loc);
        assert_eq!(ord, Some(Ordering::Equal));
        let ord = compare(&Value::String("10".into()), &Value::Integer(9), &[], &loc);
        assert_eq!(ord, Some(Ordering::Greater));
    }

    #[test]
    fn non_numeric_string_is_not_comparable_with_integer() {
        let loc = Location::Utc;
        let ord = compare(&Value::String("notexist".into()), &Value::Integer(2), &[], &loc);
        assert_eq!(ord, None);
    }

    #[test]
    fn custom_datetime_format_is_tried_first() {
        let formats = vec!["%d%m%Y".to_string()];
        let dt = Value::String("01022012".into())
            .to_datetime(&formats, &Location::Utc)
            .expect("parsed");
        assert_eq!(dt.to_rfc3339(), "2012-02-01T00:00:00+00:00");
    }

    #[test]
    fn integer_projection_rejects_fractions() {
        assert_eq!(Value::String(" 3 ".into()).to_integer(), Some(3));
        assert_eq!(Value::Float(1.5).to_integer(), None);
        assert_eq!(Value::Float(2.0).to_integer(), Some(2));
    }
}
