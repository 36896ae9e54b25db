use chrono::{DateTime, FixedOffset};

use crate::error::CsvMiddlewareError;

/// Host-side scalar produced by result cursors and accepted as a statement argument.
///
/// ```rust
/// use csv_sql_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Instant with the offset it was produced in
    Timestamp(DateTime<FixedOffset>),
    /// NULL value
    Null,
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    /// Timestamp value, or text in RFC 3339 form.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text()
            && let Ok(dt) = DateTime::parse_from_rfc3339(s)
        {
            return Some(dt);
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }
}

/// Transaction isolation levels a caller may request.
///
/// Only [`IsolationLevel::Default`] is accepted when beginning a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    WriteCommitted,
    RepeatableRead,
    Snapshot,
    Serializable,
    Linearizable,
}

/// Options for [`crate::Connection::begin_tx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

/// Outcome of a statement run through `exec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    rows_affected: usize,
}

impl ExecResult {
    #[must_use]
    pub fn new(rows_affected: usize) -> Self {
        Self { rows_affected }
    }

    /// Rows inserted, updated, or deleted by the statement.
    #[must_use]
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    /// # Errors
    ///
    /// Always fails: tables have no generated keys.
    pub fn last_insert_id(&self) -> Result<i64, CsvMiddlewareError> {
        Err(CsvMiddlewareError::Unsupported(
            "csvq does not support LastInsertId()".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_insert_id_is_unsupported() {
        let result = ExecResult::new(3);
        assert_eq!(result.rows_affected(), 3);
        let err = result.last_insert_id().unwrap_err();
        assert_eq!(err.to_string(), "csvq does not support LastInsertId()");
    }

    #[test]
    fn timestamps_accept_rfc3339_text() {
        let v = RowValues::Text("2012-02-03T09:18:15-08:00".into());
        let dt = v.as_timestamp().unwrap();
        assert_eq!(dt.offset().local_minus_utc(), -8 * 3600);
        assert!(RowValues::Int(1).as_timestamp().is_none());
        assert_eq!(RowValues::Int(0).as_bool(), Some(&false));
    }
}
