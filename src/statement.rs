use std::collections::HashMap;
use std::sync::Arc;

use crate::context::QueryContext;
use crate::conversion::{Arg, convert_args};
use crate::engine::{ParseOptions, ParsedQuery, Processor, ReplaceValues, Value, View, parse};
use crate::error::CsvMiddlewareError;
use crate::results::Rows;
use crate::types::ExecResult;

/// A parsed query bound to a connection's unit of work.
///
/// The statement keeps its own result slots but shares uncommitted tables and locks with the
/// connection it was prepared on, so it observes an open transaction.
#[derive(Debug)]
pub struct PreparedStatement {
    proc: Processor,
    sql: String,
    query: ParsedQuery,
    closed: bool,
}

impl PreparedStatement {
    pub(crate) fn new(
        ctx: &QueryContext,
        parent: &Processor,
        sql: &str,
    ) -> Result<Self, CsvMiddlewareError> {
        ctx.check()?;
        let options = ParseOptions {
            ansi_quotes: parent.flags().ansi_quotes,
        };
        let query = parse(sql, options)?;
        tracing::debug!(
            statements = query.statements.len(),
            placeholders = query.ordinal_count + query.names.len(),
            "prepared statement"
        );
        Ok(Self {
            proc: parent.child(),
            sql: sql.to_string(),
            query,
            closed: false,
        })
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of distinct placeholders: every `?` plus each `:name` once.
    #[must_use]
    pub fn num_input(&self) -> usize {
        self.query.ordinal_count + self.query.names.len()
    }

    /// Run the statement and return a cursor over the views it produced.
    ///
    /// # Errors
    /// Returns conversion and binding failures before any engine work, then engine failures.
    pub fn query(&mut self, ctx: &QueryContext, args: &[Arg]) -> Result<Rows, CsvMiddlewareError> {
        self.run(ctx, args)?;
        let (views, _) = self.proc.take_results();
        Ok(Rows::new(views))
    }

    /// Run the statement for its side effects.
    ///
    /// # Errors
    /// Returns conversion and binding failures before any engine work, then engine failures.
    pub fn exec(&mut self, ctx: &QueryContext, args: &[Arg]) -> Result<ExecResult, CsvMiddlewareError> {
        self.run(ctx, args)?;
        Ok(ExecResult::new(self.proc.affected_rows()))
    }

    pub(crate) fn run(&mut self, ctx: &QueryContext, args: &[Arg]) -> Result<(), CsvMiddlewareError> {
        if self.closed {
            return Err(CsvMiddlewareError::StatementClosed);
        }
        ctx.check()?;
        let replace = bind(&self.query, args)?;
        self.proc
            .execute(ctx, &self.query.statements, &replace)
            .map_err(CsvMiddlewareError::from)
    }

    pub(crate) fn take_results(&mut self) -> (Vec<Arc<View>>, usize) {
        self.proc.take_results()
    }

    /// Release the statement's results. Further use fails; closing again is a no-op.
    pub fn close(&mut self) {
        if !self.closed {
            self.proc.take_results();
            self.closed = true;
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolve arguments against the statement's placeholders.
///
/// Every argument is converted first. Positional arguments fill `?` placeholders left to right;
/// named arguments fill `:name` placeholders, or the next `?` when the statement has no named
/// placeholders.
pub(crate) fn bind(query: &ParsedQuery, args: &[Arg]) -> Result<ReplaceValues, CsvMiddlewareError> {
    let converted = convert_args(args)?;

    let mut ordinal: Vec<Value> = Vec::with_capacity(query.ordinal_count);
    let mut named: HashMap<String, Value> = HashMap::with_capacity(query.names.len());
    for (name, value) in converted {
        let name = name.map(|n| n.strip_prefix(':').unwrap_or(n));
        match name {
            Some(name) if query.names.iter().any(|n| n == name) => {
                if named.insert(name.to_string(), value).is_some() {
                    return Err(CsvMiddlewareError::Binding(format!(
                        "argument :{name} is given more than once"
                    )));
                }
            }
            Some(name) if !query.names.is_empty() => {
                return Err(CsvMiddlewareError::Binding(format!(
                    "no placeholder named :{name}"
                )));
            }
            _ => {
                if ordinal.len() >= query.ordinal_count {
                    return Err(CsvMiddlewareError::Binding(format!(
                        "too many arguments: statement has {} ? placeholder(s)",
                        query.ordinal_count
                    )));
                }
                ordinal.push(value);
            }
        }
    }

    if ordinal.len() < query.ordinal_count {
        return Err(CsvMiddlewareError::Binding(format!(
            "no value for placeholder ?{}",
            ordinal.len() + 1
        )));
    }
    if let Some(missing) = query.names.iter().find(|n| !named.contains_key(*n)) {
        return Err(CsvMiddlewareError::Binding(format!(
            "no value for placeholder :{missing}"
        )));
    }
    Ok(ReplaceValues { ordinal, named })
}
