use crate::connection::Connection;
use crate::context::QueryContext;
use crate::conversion::Arg;
use crate::engine::{ControlToken, TransactionControl};
use crate::error::CsvMiddlewareError;
use crate::results::Rows;
use crate::statement::PreparedStatement;
use crate::types::{ExecResult, RowValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Done,
}

/// Explicit unit of work on a [`Connection`].
///
/// Auto-commit is off while the transaction is active. `commit` and `rollback` end it whether
/// or not they succeed; after that every operation fails with
/// [`CsvMiddlewareError::TxDone`]. Dropping an active transaction rolls it back.
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c mut Connection,
    state: TxState,
}

impl<'c> Transaction<'c> {
    pub(crate) fn begin(conn: &'c mut Connection) -> Self {
        conn.processor().set_auto_commit(false);
        tracing::debug!("began csv transaction");
        Self {
            conn,
            state: TxState::Active,
        }
    }

    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    fn ensure_active(&self) -> Result<(), CsvMiddlewareError> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Done => Err(CsvMiddlewareError::TxDone),
        }
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] after commit or rollback, else as
    /// [`Connection::query`].
    pub fn query(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<Rows, CsvMiddlewareError> {
        self.ensure_active()?;
        self.conn.query(ctx, sql, args)
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] after commit or rollback, else as
    /// [`Connection::query_row`].
    pub fn query_row(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<Vec<RowValues>, CsvMiddlewareError> {
        self.ensure_active()?;
        self.conn.query_row(ctx, sql, args)
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] after commit or rollback, else as
    /// [`Connection::exec`].
    pub fn exec(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<ExecResult, CsvMiddlewareError> {
        self.ensure_active()?;
        self.conn.exec(ctx, sql, args)
    }

    /// Prepare a statement that runs inside this transaction.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] after commit or rollback, else as
    /// [`Connection::prepare`].
    pub fn prepare(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
    ) -> Result<PreparedStatement, CsvMiddlewareError> {
        self.ensure_active()?;
        self.conn.prepare(ctx, sql)
    }

    /// Write every modified table and release locks.
    ///
    /// When `ctx` fires before every table is written, the rest are discarded and the
    /// interruption is returned.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] when already finished, else the engine's commit
    /// failure or the interruption. The transaction is finished either way.
    pub fn commit(&mut self, ctx: &QueryContext) -> Result<(), CsvMiddlewareError> {
        self.ensure_active()?;
        self.finish(ctx, ControlToken::Commit, "COMMIT")
    }

    /// Discard uncommitted changes and release locks.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::TxDone`] when already finished, else the engine's rollback
    /// failure or the interruption. Changes are discarded and the transaction is finished
    /// either way.
    pub fn rollback(&mut self, ctx: &QueryContext) -> Result<(), CsvMiddlewareError> {
        self.ensure_active()?;
        self.finish(ctx, ControlToken::Rollback, "ROLLBACK")
    }

    fn finish(
        &mut self,
        ctx: &QueryContext,
        token: ControlToken,
        literal: &str,
    ) -> Result<(), CsvMiddlewareError> {
        self.state = TxState::Done;
        let control = TransactionControl::new(token, literal, 1, 1);
        let proc = self.conn.processor();
        let result = match token {
            ControlToken::Commit => proc.commit(ctx, &control),
            ControlToken::Rollback => proc.rollback(ctx, &control),
        };
        proc.set_auto_commit(true);
        tracing::debug!(action = literal, ok = result.is_ok(), "finished csv transaction");
        result.map_err(CsvMiddlewareError::from)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active
            && let Err(e) =
                self.finish(&QueryContext::background(), ControlToken::Rollback, "ROLLBACK")
        {
            tracing::warn!(error = %e, "rollback of dropped csv transaction failed");
        }
    }
}
