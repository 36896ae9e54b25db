use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::context::QueryContext;

use super::error::{EngineError, ErrorCode};
use super::eval::{Evaluator, ReplaceValues, Row};
use super::execution::{ExecutionContext, Flags, interrupted};
use super::parser::{
    ControlToken, CreateTable, DeleteQuery, Expr, InsertQuery, SelectField, SelectQuery, Statement,
    TransactionControl, UpdateQuery,
};
use super::value::Value;
use super::view::{View, field_index};

/// Runs parsed statements against a shared [`ExecutionContext`].
///
/// Processors created with [`Processor::child`] share the context (uncommitted tables, locks,
/// auto-commit) but keep their own result slots.
#[derive(Debug)]
pub struct Processor {
    tx: Arc<Mutex<ExecutionContext>>,
    selected_views: Vec<Arc<View>>,
    affected_rows: usize,
}

impl Processor {
    #[must_use]
    pub fn new(tx: ExecutionContext) -> Self {
        Self {
            tx: Arc::new(Mutex::new(tx)),
            selected_views: Vec::new(),
            affected_rows: 0,
        }
    }

    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
            selected_views: Vec::new(),
            affected_rows: 0,
        }
    }

    fn context(&self) -> MutexGuard<'_, ExecutionContext> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn flags(&self) -> Flags {
        self.context().flags.clone()
    }

    #[must_use]
    pub fn auto_commit(&self) -> bool {
        self.context().auto_commit
    }

    pub fn set_auto_commit(&self, auto_commit: bool) {
        self.context().auto_commit = auto_commit;
    }

    /// Views produced by the last execution, in statement order.
    #[must_use]
    pub fn selected_views(&self) -> &[Arc<View>] {
        &self.selected_views
    }

    #[must_use]
    pub fn affected_rows(&self) -> usize {
        self.affected_rows
    }

    /// Move the last results out, leaving the slots empty.
    pub fn take_results(&mut self) -> (Vec<Arc<View>>, usize) {
        let views = std::mem::take(&mut self.selected_views);
        let affected = std::mem::replace(&mut self.affected_rows, 0);
        (views, affected)
    }

    pub fn set_results(&mut self, views: Vec<Arc<View>>, affected_rows: usize) {
        self.selected_views = views;
        self.affected_rows = affected_rows;
    }

    /// Execute statements in order, recording produced views and affected rows.
    ///
    /// With auto-commit enabled the unit of work is committed on success and rolled back on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the first statement failure, or an interruption when `ctx` fires between
    /// statements or rows.
    pub fn execute(
        &mut self,
        ctx: &QueryContext,
        statements: &[Statement],
        replace: &ReplaceValues,
    ) -> Result<(), EngineError> {
        self.selected_views.clear();
        self.affected_rows = 0;

        let result = self.run(ctx, statements, replace);
        if !self.auto_commit() {
            return result;
        }
        match result {
            Ok(()) => self.commit(
                ctx,
                &TransactionControl::new(ControlToken::Commit, "COMMIT", 0, 0),
            ),
            Err(e) => {
                if let Err(rollback) = self.auto_rollback() {
                    self.context().session.log_error(&rollback.to_string());
                }
                Err(e)
            }
        }
    }

    fn run(
        &mut self,
        ctx: &QueryContext,
        statements: &[Statement],
        replace: &ReplaceValues,
    ) -> Result<(), EngineError> {
        for statement in statements {
            ctx.check().map_err(interrupted)?;
            match statement {
                Statement::Select(query) => {
                    let view = self.select(ctx, query, replace)?;
                    self.selected_views.push(Arc::new(view));
                }
                Statement::Insert(query) => self.affected_rows += self.insert(ctx, query, replace)?,
                Statement::Update(query) => self.affected_rows += self.update(ctx, query, replace)?,
                Statement::Delete(query) => self.affected_rows += self.delete(ctx, query, replace)?,
                Statement::CreateTable(query) => self.create_table(ctx, query)?,
                Statement::TransactionControl(token) => match token.token {
                    ControlToken::Commit => self.commit(ctx, token)?,
                    ControlToken::Rollback => self.rollback(ctx, token)?,
                },
            }
        }
        Ok(())
    }

    fn select(
        &self,
        ctx: &QueryContext,
        query: &SelectQuery,
        replace: &ReplaceValues,
    ) -> Result<View, EngineError> {
        let tx = self.context();
        let eval = Evaluator::new(&tx.flags, replace);
        let source = match &query.from {
            Some(table) => tx.load_for_read(ctx, table)?,
            None => View::new(Vec::new(), vec![Vec::new()]),
        };

        let limit = match &query.limit {
            None => None,
            Some(expr) => match eval.eval(expr, None)?.to_integer() {
                Some(n) if n >= 0 => Some(usize::try_from(n).unwrap_or(usize::MAX)),
                _ => {
                    return Err(EngineError::unpositioned(
                        ErrorCode::InvalidValue,
                        format!("limit {expr} is not a non-negative integer"),
                    ));
                }
            },
        };

        let mut header = Vec::new();
        for field in &query.fields {
            match field {
                SelectField::All => header.extend(source.header.iter().cloned()),
                SelectField::Expr { expr, alias } => header.push(match (alias, expr) {
                    (Some(alias), _) => alias.clone(),
                    (None, Expr::Column { name, .. }) => name.clone(),
                    (None, expr) => expr.to_string(),
                }),
            }
        }

        let mut records = Vec::new();
        for record in &source.records {
            if limit.is_some_and(|n| records.len() >= n) {
                break;
            }
            ctx.check().map_err(interrupted)?;
            let row = Row {
                header: &source.header,
                record,
            };
            if !eval.matches(query.where_clause.as_ref(), Some(row))? {
                continue;
            }
            let mut out = Vec::with_capacity(header.len());
            for field in &query.fields {
                match field {
                    SelectField::All => out.extend(record.iter().cloned()),
                    SelectField::Expr { expr, .. } => out.push(eval.eval(expr, Some(row))?),
                }
            }
            records.push(out);
        }
        Ok(View::new(header, records))
    }

    fn insert(
        &self,
        ctx: &QueryContext,
        query: &InsertQuery,
        replace: &ReplaceValues,
    ) -> Result<usize, EngineError> {
        let mut tx = self.context();
        let flags = tx.flags.clone();
        let eval = Evaluator::new(&flags, replace);

        let mut rows = Vec::with_capacity(query.rows.len());
        for exprs in &query.rows {
            ctx.check().map_err(interrupted)?;
            let mut values = Vec::with_capacity(exprs.len());
            for expr in exprs {
                values.push(eval.eval(expr, None)?);
            }
            rows.push(values);
        }

        let state = tx.load_for_update(ctx, &query.table)?;
        let targets: Vec<usize> = match &query.columns {
            None => (0..state.header.len()).collect(),
            Some(columns) => {
                let mut targets = Vec::with_capacity(columns.len());
                for column in columns {
                    let idx = field_index(&state.header, column).ok_or_else(|| {
                        EngineError::new(
                            ErrorCode::FieldNotExist,
                            query.table.pos.line,
                            query.table.pos.char,
                            format!("field {column} does not exist"),
                        )
                    })?;
                    targets.push(idx);
                }
                targets
            }
        };

        let width = state.header.len();
        let mut records = Vec::with_capacity(rows.len());
        for values in rows {
            if values.len() != targets.len() {
                return Err(EngineError::new(
                    ErrorCode::FieldLength,
                    query.table.pos.line,
                    query.table.pos.char,
                    format!("row value should contain exactly {} values", targets.len()),
                ));
            }
            let mut record = vec![Value::Null; width];
            for (idx, value) in targets.iter().zip(values) {
                record[*idx] = value;
            }
            records.push(record);
        }

        let inserted = records.len();
        state.records.extend(records);
        state.dirty = true;
        let name = state.name.clone();
        tx.session
            .log(&format!("{inserted} record(s) inserted on \"{name}\"."));
        Ok(inserted)
    }

    fn update(
        &self,
        ctx: &QueryContext,
        query: &UpdateQuery,
        replace: &ReplaceValues,
    ) -> Result<usize, EngineError> {
        let mut tx = self.context();
        let flags = tx.flags.clone();
        let eval = Evaluator::new(&flags, replace);
        let state = tx.load_for_update(ctx, &query.table)?;

        let mut targets = Vec::with_capacity(query.set.len());
        for (column, pos, expr) in &query.set {
            let idx = field_index(&state.header, column).ok_or_else(|| {
                EngineError::new(
                    ErrorCode::FieldNotExist,
                    pos.line,
                    pos.char,
                    format!("field {column} does not exist"),
                )
            })?;
            targets.push((idx, expr));
        }

        let mut updated = 0;
        for i in 0..state.records.len() {
            ctx.check().map_err(interrupted)?;
            let row = Row {
                header: &state.header,
                record: &state.records[i],
            };
            if !eval.matches(query.where_clause.as_ref(), Some(row))? {
                continue;
            }
            let mut values = Vec::with_capacity(targets.len());
            for (idx, expr) in &targets {
                values.push((*idx, eval.eval(expr, Some(row))?));
            }
            for (idx, value) in values {
                state.records[i][idx] = value;
            }
            updated += 1;
        }
        if updated > 0 {
            state.dirty = true;
        }
        let name = state.name.clone();
        tx.session
            .log(&format!("{updated} record(s) updated on \"{name}\"."));
        Ok(updated)
    }

    fn delete(
        &self,
        ctx: &QueryContext,
        query: &DeleteQuery,
        replace: &ReplaceValues,
    ) -> Result<usize, EngineError> {
        let mut tx = self.context();
        let flags = tx.flags.clone();
        let eval = Evaluator::new(&flags, replace);
        let state = tx.load_for_update(ctx, &query.table)?;

        let mut kept = Vec::with_capacity(state.records.len());
        let mut deleted = 0;
        for record in std::mem::take(&mut state.records) {
            ctx.check().map_err(interrupted)?;
            let row = Row {
                header: &state.header,
                record: &record,
            };
            if eval.matches(query.where_clause.as_ref(), Some(row))? {
                deleted += 1;
            } else {
                kept.push(record);
            }
        }
        state.records = kept;
        if deleted > 0 {
            state.dirty = true;
        }
        let name = state.name.clone();
        tx.session
            .log(&format!("{deleted} record(s) deleted on \"{name}\"."));
        Ok(deleted)
    }

    fn create_table(&self, ctx: &QueryContext, query: &CreateTable) -> Result<(), EngineError> {
        let mut tx = self.context();
        for (i, column) in query.columns.iter().enumerate() {
            if query.columns[..i].iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Err(EngineError::new(
                    ErrorCode::FieldLength,
                    query.table.pos.line,
                    query.table.pos.char,
                    format!("field name {column} is a duplicate"),
                ));
            }
        }
        tx.create_table(ctx, &query.table, query.columns.clone())?;
        tx.session
            .log(&format!("file \"{}\" is created.", query.table.name));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the engine's commit failure, positioned at `token`, or the interruption when
    /// `ctx` fires before every table is written.
    pub fn commit(&self, ctx: &QueryContext, token: &TransactionControl) -> Result<(), EngineError> {
        self.context().commit(ctx, token)
    }

    /// # Errors
    ///
    /// Returns the engine's rollback failure, positioned at `token`, or the interruption when
    /// `ctx` has fired. Changes are discarded either way.
    pub fn rollback(
        &self,
        ctx: &QueryContext,
        token: &TransactionControl,
    ) -> Result<(), EngineError> {
        self.context().rollback(ctx, token)
    }

    /// Roll back only when the unit of work holds uncommitted changes.
    ///
    /// # Errors
    ///
    /// Returns the rollback failure.
    pub fn auto_rollback(&self) -> Result<(), EngineError> {
        let mut tx = self.context();
        if !tx.has_uncommitted_changes() {
            return Ok(());
        }
        tx.rollback(
            &QueryContext::background(),
            &TransactionControl::new(ControlToken::Rollback, "ROLLBACK", 0, 0),
        )
    }

    /// Release every held resource, attempting all of them.
    ///
    /// # Errors
    ///
    /// Returns the collected release failures as one error.
    pub fn release_resources_with_errors(&self) -> Result<(), EngineError> {
        self.context().release_resources()
    }
}
