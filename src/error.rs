use std::fmt;

use thiserror::Error;

use crate::context::Interrupted;
use crate::engine::{EngineError, ErrorCode};

#[derive(Debug, Error)]
pub enum CsvMiddlewareError {
    #[error("driver: bad connection")]
    BadConnection,

    #[error(transparent)]
    Engine(EngineError),

    #[error("{0}")]
    Conversion(String),

    #[error("{0}")]
    Binding(String),

    /// A row of `row` values was read into a destination of `dest` slots.
    #[error("column length does not match")]
    ColumnArity { row: usize, dest: usize },

    #[error("no more rows or result sets")]
    Exhausted,

    #[error("query returned no rows")]
    NoRows,

    #[error("{0}")]
    Unsupported(String),

    #[error("transaction has already been committed or rolled back")]
    TxDone,

    #[error("statement is closed")]
    StatementClosed,

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("context canceled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),
}

/// Engine failures are wrapped as-is, except interruptions which surface as their own variants.
impl From<EngineError> for CsvMiddlewareError {
    fn from(err: EngineError) -> Self {
        match err.code() {
            ErrorCode::Cancelled => CsvMiddlewareError::Cancelled,
            ErrorCode::DeadlineExceeded => CsvMiddlewareError::DeadlineExceeded,
            _ => CsvMiddlewareError::Engine(err),
        }
    }
}

impl CsvMiddlewareError {
    /// Failure raised by the engine while parsing, executing, or committing.
    #[must_use]
    pub fn is_engine_error(&self) -> bool {
        matches!(self, CsvMiddlewareError::Engine(_))
    }

    /// Failure caused by how the API was called rather than by the data.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            CsvMiddlewareError::Conversion(_)
                | CsvMiddlewareError::Binding(_)
                | CsvMiddlewareError::ColumnArity { .. }
                | CsvMiddlewareError::Unsupported(_)
                | CsvMiddlewareError::TxDone
                | CsvMiddlewareError::StatementClosed
                | CsvMiddlewareError::InvalidDsn(_)
        )
    }

    /// The wrapped engine error, if any.
    #[must_use]
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            CsvMiddlewareError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Interrupted> for CsvMiddlewareError {
    fn from(reason: Interrupted) -> Self {
        match reason {
            Interrupted::Cancelled => CsvMiddlewareError::Cancelled,
            Interrupted::DeadlineExceeded => CsvMiddlewareError::DeadlineExceeded,
        }
    }
}

/// Several failures collected while releasing a connection.
///
/// Displays the messages joined by newlines, in the order they occurred.
#[derive(Debug)]
pub struct CompositeError {
    pub errors: Vec<CsvMiddlewareError>,
}

impl CompositeError {
    #[must_use]
    pub fn new(errors: Vec<CsvMiddlewareError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

/// Fold cleanup results: no error, the single error, or a composite of all of them.
pub(crate) fn aggregate(errors: Vec<CsvMiddlewareError>) -> Result<(), CsvMiddlewareError> {
    let mut errors = errors;
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(CsvMiddlewareError::Composite(CompositeError::new(errors))),
    }
}
