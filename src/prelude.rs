//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::connection::Connection;
pub use crate::context::{Interrupted, QueryContext};
pub use crate::conversion::{Arg, SqlArg, arg, convert_value, named, to_row_value};
pub use crate::driver::{Connector, CsvqOptions, CsvqOptionsBuilder, Driver};
pub use crate::dsn::Dsn;
pub use crate::error::{CompositeError, CsvMiddlewareError};
pub use crate::results::Rows;
pub use crate::results::result_set::ResultSet;
pub use crate::results::row::CustomDbRow;
pub use crate::session::{set_stderr, set_stdin, set_stdout};
pub use crate::statement::PreparedStatement;
pub use crate::transaction::{Transaction, TxState};
pub use crate::types::{ExecResult, IsolationLevel, RowValues, TxOptions};

pub use crate::engine::{EngineError, ErrorCode, Session, Value};
