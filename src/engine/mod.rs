//! File-backed SQL engine wrapped by the adapter.
//!
//! Tables are CSV files under a repository directory. The engine parses a small SQL dialect
//! with `sqlparser`, evaluates it against in-memory snapshots, and writes modified tables back
//! on commit while holding a lock file per table.

mod csv;
mod error;
mod eval;
mod execution;
mod parser;
mod processor;
mod session;
mod value;
mod view;

pub use error::{EngineError, ErrorCode};
pub use eval::ReplaceValues;
pub use execution::{ExecutionContext, Flags, Location};
pub use parser::{
    CompareOp, ControlToken, CreateTable, DeleteQuery, Expr, InsertQuery, ParseOptions,
    ParsedQuery, Placeholder, Pos, SelectField, SelectQuery, Statement, TableRef,
    TransactionControl, UpdateQuery, parse,
};
pub use processor::Processor;
pub use session::{Discard, Session};
pub use value::{Ternary, Value};
pub use view::View;
