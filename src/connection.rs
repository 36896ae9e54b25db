use std::path::Path;

use crate::context::QueryContext;
use crate::conversion::Arg;
use crate::driver::CsvqOptions;
use crate::dsn::Dsn;
use crate::engine::{ExecutionContext, Flags, ParseOptions, Processor, ReplaceValues, parse};
use crate::error::{CsvMiddlewareError, aggregate};
use crate::results::Rows;
use crate::session::shared_session;
use crate::statement::PreparedStatement;
use crate::transaction::Transaction;
use crate::types::{ExecResult, IsolationLevel, RowValues, TxOptions};

/// A session against one repository directory.
///
/// Statements run in auto-commit mode unless a [`Transaction`] is open. Closing (explicitly or
/// on drop) rolls back anything uncommitted and releases every table lock.
#[derive(Debug)]
pub struct Connection {
    dsn: Dsn,
    proc: Processor,
    closed: bool,
}

impl Connection {
    /// Open a connection with default wait timeout and retry delay.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] when the locator is malformed or the
    /// repository cannot be used.
    pub fn open(ctx: &QueryContext, dsn: &str) -> Result<Self, CsvMiddlewareError> {
        Self::open_with_options(ctx, &CsvqOptions::new(dsn))
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] when the locator is malformed or the
    /// repository cannot be used.
    pub fn open_with_options(
        ctx: &QueryContext,
        options: &CsvqOptions,
    ) -> Result<Self, CsvMiddlewareError> {
        ctx.check()?;
        let bad = |reason: &dyn std::fmt::Display| {
            tracing::debug!(dsn = %options.dsn, %reason, "failed to open csv connection");
            CsvMiddlewareError::BadConnection
        };

        let dsn = Dsn::parse(&options.dsn).map_err(|e| bad(&e))?;
        let mut flags = Flags {
            wait_timeout: options.wait_timeout,
            retry_delay: options.retry_delay,
            ..Flags::default()
        };
        flags.set_repository(dsn.repository()).map_err(|e| bad(&e))?;
        flags.set_location(dsn.timezone()).map_err(|e| bad(&e))?;
        flags
            .set_datetime_format(dsn.datetime_format())
            .map_err(|e| bad(&e))?;
        flags.set_ansi_quotes(dsn.ansi_quotes());

        let session = options.session.clone().unwrap_or_else(shared_session);
        let mut tx = ExecutionContext::new(session, flags);
        tx.auto_commit = true;

        tracing::debug!(repository = dsn.repository(), "opened csv connection");
        Ok(Self {
            dsn,
            proc: Processor::new(tx),
            closed: false,
        })
    }

    #[must_use]
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), CsvMiddlewareError> {
        if self.closed {
            Err(CsvMiddlewareError::BadConnection)
        } else {
            Ok(())
        }
    }

    /// Check that the connection is open and its repository is still a directory.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] otherwise.
    pub fn ping(&self, ctx: &QueryContext) -> Result<(), CsvMiddlewareError> {
        self.ensure_open()?;
        ctx.check()?;
        if Path::new(&self.proc.flags().repository).is_dir() {
            Ok(())
        } else {
            Err(CsvMiddlewareError::BadConnection)
        }
    }

    /// Parse a query once for repeated execution.
    ///
    /// # Errors
    /// Returns the syntax error, positioned in the query text.
    pub fn prepare(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
    ) -> Result<PreparedStatement, CsvMiddlewareError> {
        self.ensure_open()?;
        PreparedStatement::new(ctx, &self.proc, sql)
    }

    /// Begin a transaction with default options.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::BadConnection`] on a closed connection.
    pub fn begin(&mut self, ctx: &QueryContext) -> Result<Transaction<'_>, CsvMiddlewareError> {
        self.begin_tx(ctx, TxOptions::default())
    }

    /// # Errors
    /// Returns [`CsvMiddlewareError::Unsupported`] for a non-default isolation level or a
    /// read-only request.
    pub fn begin_tx(
        &mut self,
        ctx: &QueryContext,
        options: TxOptions,
    ) -> Result<Transaction<'_>, CsvMiddlewareError> {
        self.ensure_open()?;
        ctx.check()?;
        if options.isolation != IsolationLevel::Default {
            return Err(CsvMiddlewareError::Unsupported(
                "csvq does not support non-default isolation level".to_string(),
            ));
        }
        if options.read_only {
            return Err(CsvMiddlewareError::Unsupported(
                "csvq does not support read-only transactions".to_string(),
            ));
        }
        Ok(Transaction::begin(self))
    }

    /// Run a query and return a cursor over every view it produced.
    ///
    /// # Errors
    /// Returns conversion, binding, and engine failures.
    pub fn query(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<Rows, CsvMiddlewareError> {
        self.run(ctx, sql, args)?;
        let (views, _) = self.proc.take_results();
        Ok(Rows::new(views))
    }

    /// First row of the first view.
    ///
    /// # Errors
    /// Returns [`CsvMiddlewareError::NoRows`] when the query produced no rows.
    pub fn query_row(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<Vec<RowValues>, CsvMiddlewareError> {
        let mut rows = self.query(ctx, sql, args)?;
        let width = rows.columns().map_or(0, <[String]>::len);
        let mut dest = vec![RowValues::Null; width];
        let result = match rows.next_row(&mut dest) {
            Ok(()) => Ok(dest),
            Err(CsvMiddlewareError::Exhausted) => Err(CsvMiddlewareError::NoRows),
            Err(e) => Err(e),
        };
        rows.close();
        result
    }

    /// Run a statement for its side effects.
    ///
    /// # Errors
    /// Returns conversion, binding, and engine failures.
    pub fn exec(
        &mut self,
        ctx: &QueryContext,
        sql: &str,
        args: &[Arg],
    ) -> Result<ExecResult, CsvMiddlewareError> {
        self.run(ctx, sql, args)?;
        let (_, affected) = self.proc.take_results();
        Ok(ExecResult::new(affected))
    }

    fn run(&mut self, ctx: &QueryContext, sql: &str, args: &[Arg]) -> Result<(), CsvMiddlewareError> {
        self.ensure_open()?;
        ctx.check()?;
        if args.is_empty() {
            let options = ParseOptions {
                ansi_quotes: self.proc.flags().ansi_quotes,
            };
            let query = parse(sql, options)?;
            return self
                .proc
                .execute(ctx, &query.statements, &ReplaceValues::default())
                .map_err(CsvMiddlewareError::from);
        }

        let mut stmt = PreparedStatement::new(ctx, &self.proc, sql)?;
        let result = stmt.run(ctx, args);
        let (views, affected) = match &result {
            Ok(()) => stmt.take_results(),
            Err(_) => (Vec::new(), 0),
        };
        stmt.close();
        self.proc.set_results(views, affected);
        result
    }

    pub(crate) fn processor(&self) -> &Processor {
        &self.proc
    }

    /// Roll back uncommitted work and release every lock.
    ///
    /// Both steps always run. One failure is returned as-is; two are returned as a
    /// [`CsvMiddlewareError::Composite`]. The rollback step drains every lock, including those
    /// it fails to remove, so when it runs the release step finds nothing left and a failed
    /// close reports the single rollback error listing each lock, one per line. Closing an
    /// already closed connection is a no-op.
    ///
    /// # Errors
    /// Returns the cleanup failures described above.
    pub fn close(&mut self) -> Result<(), CsvMiddlewareError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = Vec::new();
        if let Err(e) = self.proc.auto_rollback() {
            errors.push(CsvMiddlewareError::from(e));
        }
        if let Err(e) = self.proc.release_resources_with_errors() {
            errors.push(CsvMiddlewareError::from(e));
        }
        self.proc.take_results();
        tracing::debug!(
            repository = self.dsn.repository(),
            failures = errors.len(),
            "closed csv connection"
        );
        aggregate(errors)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "csv connection cleanup failed on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::fs;

    use super::*;
    use crate::engine::ErrorCode;

    #[test]
    fn close_reports_vanished_locks_as_one_rollback_error() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.csv"), "col1\n1\n")?;
        fs::write(dir.path().join("b.csv"), "col1\n1\n")?;
        let ctx = QueryContext::background();
        let mut conn = Connection::open(&ctx, &dir.path().to_string_lossy())?;
        conn.processor().set_auto_commit(false);
        conn.exec(&ctx, "DELETE FROM a; DELETE FROM b", &[])?;
        fs::remove_file(dir.path().join(".a.csv.lock"))?;
        fs::remove_file(dir.path().join(".b.csv.lock"))?;

        let err = conn.close().unwrap_err();
        assert!(!matches!(err, CsvMiddlewareError::Composite(_)));
        let engine = err.engine_error().ok_or("expected an engine error")?;
        assert_eq!(engine.code(), ErrorCode::Rollback);
        let lines: Vec<&str> = engine.message().lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(".a.csv.lock"));
        assert!(lines[1].contains(".b.csv.lock"));

        assert!(conn.is_closed());
        conn.close()?;
        Ok(())
    }

    #[test]
    fn close_without_pending_work_succeeds() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.csv"), "col1\n1\n")?;
        let ctx = QueryContext::background();
        let mut conn = Connection::open(&ctx, &dir.path().to_string_lossy())?;
        conn.exec(&ctx, "DELETE FROM a", &[])?;
        conn.close()?;
        assert!(!dir.path().join(".a.csv.lock").exists());
        assert!(matches!(conn.ping(&ctx), Err(CsvMiddlewareError::BadConnection)));
        Ok(())
    }
}
