//! Query directories of CSV files through a conventional database client surface.
//!
//! A [`Connection`] is opened on a repository directory; each `.csv` file in it is a table.
//! Queries return [`Rows`] cursors, statements can be prepared with `?` or `:name`
//! placeholders, and writes are grouped in a [`Transaction`] or committed one statement at a
//! time.
//!
//! ```rust,no_run
//! use csv_sql_middleware::prelude::*;
//!
//! # fn main() -> Result<(), CsvMiddlewareError> {
//! let ctx = QueryContext::background();
//! let mut conn = Connection::open(&ctx, "/path/to/repository?timezone=UTC")?;
//! let mut rows = conn.query(&ctx, "SELECT col1, col2 FROM items.csv WHERE col1 = ?", &[arg(1_i64)])?;
//! let result = rows.fetch_all();
//! for row in &result.results {
//!     println!("{:?}", row.get("col2"));
//! }
//! conn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod context;
pub mod conversion;
pub mod driver;
pub mod dsn;
pub mod engine;
pub mod error;
pub mod prelude;
pub mod results;
pub mod session;
pub mod statement;
pub mod transaction;
pub mod types;

pub use connection::Connection;
pub use context::{Interrupted, QueryContext};
pub use conversion::{Arg, SqlArg, arg, convert_value, named};
pub use driver::{Connector, CsvqOptions, CsvqOptionsBuilder, Driver};
pub use dsn::Dsn;
pub use error::{CompositeError, CsvMiddlewareError};
pub use results::Rows;
pub use results::result_set::ResultSet;
pub use results::row::CustomDbRow;
pub use statement::PreparedStatement;
pub use transaction::{Transaction, TxState};
pub use types::{ExecResult, IsolationLevel, RowValues, TxOptions};
