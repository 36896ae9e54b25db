use std::sync::Arc;

use crate::conversion::to_row_value;
use crate::engine::{Value, View};
use crate::error::CsvMiddlewareError;
use crate::types::RowValues;

/// Forward-only position within one view.
#[derive(Debug, Clone)]
pub(crate) struct ViewCursor {
    view: Arc<View>,
    row_index: usize,
}

impl ViewCursor {
    pub(crate) fn new(view: Arc<View>) -> Self {
        Self { view, row_index: 0 }
    }

    pub(crate) fn columns(&self) -> &[String] {
        self.view.column_names()
    }

    pub(crate) fn next_row(&mut self, dest: &mut [RowValues]) -> Result<(), CsvMiddlewareError> {
        let record = self.peek().ok_or(CsvMiddlewareError::Exhausted)?;
        if record.len() != dest.len() {
            return Err(CsvMiddlewareError::ColumnArity {
                row: record.len(),
                dest: dest.len(),
            });
        }
        for (slot, value) in dest.iter_mut().zip(record) {
            *slot = to_row_value(value);
        }
        self.row_index += 1;
        Ok(())
    }

    /// Consume every remaining record.
    pub(crate) fn drain(&mut self) -> Vec<Vec<RowValues>> {
        let start = self.row_index.min(self.view.records.len());
        self.row_index = self.view.records.len();
        self.view.records[start..]
            .iter()
            .map(|r| r.iter().map(to_row_value).collect())
            .collect()
    }

    fn peek(&self) -> Option<&[Value]> {
        self.view.records.get(self.row_index).map(Vec::as_slice)
    }
}
