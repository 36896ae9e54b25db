//! Multi-set result cursor.
//!
//! A query may produce several views (one per `SELECT`); [`Rows`] walks them in production
//! order. Rows are converted to [`RowValues`] as they are read.

mod cursor;
pub mod result_set;
pub mod row;

use std::sync::Arc;

use cursor::ViewCursor;
pub use result_set::ResultSet;
pub use row::CustomDbRow;

use crate::engine::View;
use crate::error::CsvMiddlewareError;
use crate::types::RowValues;

/// Cursor over the views produced by one execution.
///
/// ```rust,no_run
/// use csv_sql_middleware::prelude::*;
///
/// # fn run(conn: &mut Connection) -> Result<(), CsvMiddlewareError> {
/// let ctx = QueryContext::background();
/// let mut rows = conn.query(&ctx, "SELECT 1 AS a; SELECT 'x' AS b", &[])?;
/// loop {
///     let width = rows.columns().map_or(0, <[String]>::len);
///     let mut dest = vec![RowValues::Null; width];
///     while rows.next_row(&mut dest).is_ok() {
///         println!("{dest:?}");
///     }
///     if rows.next_result_set().is_err() {
///         break;
///     }
/// }
/// rows.close();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Rows {
    sets: Vec<ViewCursor>,
    index: usize,
}

impl Rows {
    #[must_use]
    pub fn new(views: Vec<Arc<View>>) -> Self {
        Self {
            sets: views.into_iter().map(ViewCursor::new).collect(),
            index: 0,
        }
    }

    /// Column names of the active set, `None` when there is none.
    #[must_use]
    pub fn columns(&self) -> Option<&[String]> {
        self.sets.get(self.index).map(ViewCursor::columns)
    }

    /// Number of result sets still held by the cursor.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Fill `dest` with the next row of the active set.
    ///
    /// # Errors
    ///
    /// [`CsvMiddlewareError::Exhausted`] when the active set has no more rows (or there is no
    /// active set); [`CsvMiddlewareError::ColumnArity`] when `dest` does not match the row width.
    pub fn next_row(&mut self, dest: &mut [RowValues]) -> Result<(), CsvMiddlewareError> {
        self.sets
            .get_mut(self.index)
            .ok_or(CsvMiddlewareError::Exhausted)?
            .next_row(dest)
    }

    #[must_use]
    pub fn has_next_result_set(&self) -> bool {
        self.index + 1 < self.sets.len()
    }

    /// Advance to the next set, positioned before its first row.
    ///
    /// # Errors
    ///
    /// [`CsvMiddlewareError::Exhausted`] when no further set remains.
    pub fn next_result_set(&mut self) -> Result<(), CsvMiddlewareError> {
        if !self.has_next_result_set() {
            return Err(CsvMiddlewareError::Exhausted);
        }
        self.index += 1;
        Ok(())
    }

    /// Materialize the remaining rows of the active set.
    pub fn fetch_all(&mut self) -> ResultSet {
        let Some(cursor) = self.sets.get_mut(self.index) else {
            return ResultSet::default();
        };
        let column_names = Arc::new(cursor.columns().to_vec());
        let rows = cursor.drain();
        let mut set = ResultSet::with_capacity(rows.len());
        set.set_column_names(column_names);
        for row in rows {
            set.add_row_values(row);
        }
        set
    }

    /// Drop every held view. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.sets.clear();
        self.index = 0;
    }
}
