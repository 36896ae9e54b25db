use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::context::{Interrupted, QueryContext};

use super::csv;
use super::error::{EngineError, ErrorCode};
use super::parser::{Pos, TableRef, TransactionControl};
use super::session::Session;
use super::value::Value;
use super::view::View;

/// Timezone applied to datetimes that carry no offset of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local,
    Utc,
    Fixed(FixedOffset),
    /// IANA zone such as `Asia/Tokyo`; the offset follows its daylight-saving rules.
    Named(Tz),
}

impl Location {
    /// Accepts `Local`, `UTC`, `Z`, a `±HH:MM` / `±HHMM` offset, or an IANA zone name.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidValue` error for any other text.
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        let trimmed = name.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(Location::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Location::Utc);
        }
        let invalid = || {
            EngineError::unpositioned(
                ErrorCode::InvalidValue,
                format!("timezone {trimmed} is not supported"),
            )
        };
        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => {
                return trimmed
                    .parse::<Tz>()
                    .map(Location::Named)
                    .map_err(|_| invalid());
            }
        };
        let digits: String = rest.chars().filter(|c| *c != ':').collect();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
        let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Location::Fixed)
            .ok_or_else(invalid)
    }

    /// Offset in effect now.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        match self {
            Location::Local => Local::now().offset().fix(),
            Location::Utc => Utc.fix(),
            Location::Fixed(offset) => *offset,
            Location::Named(tz) => Utc::now().with_timezone(tz).offset().fix(),
        }
    }

    #[must_use]
    pub fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self {
            Location::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
            Location::Utc => Some(Utc.from_utc_datetime(&naive).fixed_offset()),
            Location::Fixed(offset) => offset.from_local_datetime(&naive).single(),
            Location::Named(tz) => tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.fixed_offset()),
        }
    }
}

/// Engine configuration resolved for one execution context.
#[derive(Debug, Clone, PartialEq)]
pub struct Flags {
    pub repository: PathBuf,
    pub location: Location,
    pub datetime_format: Vec<String>,
    pub ansi_quotes: bool,
    pub wait_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("."),
            location: Location::Local,
            datetime_format: Vec::new(),
            ansi_quotes: false,
            wait_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_millis(10),
        }
    }
}

impl Flags {
    /// Point the context at a data directory; an empty path means the working directory.
    ///
    /// # Errors
    ///
    /// Returns a `Repository` error when the path does not name an existing directory.
    pub fn set_repository(&mut self, path: &str) -> Result<(), EngineError> {
        let path = if path.is_empty() { "." } else { path };
        let meta = fs::metadata(path).map_err(|_| {
            EngineError::unpositioned(
                ErrorCode::Repository,
                format!("repository {path} does not exist"),
            )
        })?;
        if !meta.is_dir() {
            return Err(EngineError::unpositioned(
                ErrorCode::Repository,
                format!("repository {path} is not a directory"),
            ));
        }
        self.repository = PathBuf::from(path);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an `InvalidValue` error for unsupported timezone text.
    pub fn set_location(&mut self, name: &str) -> Result<(), EngineError> {
        self.location = Location::parse(name)?;
        Ok(())
    }

    /// Accepts either a JSON array of formats (`["%d%m%Y"]`) or a single format string.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidValue` error when text starting with `[` is not a JSON string array.
    pub fn set_datetime_format(&mut self, format: &str) -> Result<(), EngineError> {
        let format = format.trim();
        if format.is_empty() {
            self.datetime_format.clear();
        } else if format.starts_with('[') {
            self.datetime_format = serde_json::from_str::<Vec<String>>(format).map_err(|e| {
                EngineError::unpositioned(
                    ErrorCode::InvalidValue,
                    format!("datetime format {format} is invalid: {e}"),
                )
            })?;
        } else {
            self.datetime_format = vec![format.to_string()];
        }
        Ok(())
    }

    pub fn set_ansi_quotes(&mut self, ansi_quotes: bool) {
        self.ansi_quotes = ansi_quotes;
    }
}

/// Uncommitted state of a table touched by the current unit of work.
#[derive(Debug, Clone)]
pub(crate) struct TableState {
    pub(crate) name: String,
    pub(crate) header: Vec<String>,
    pub(crate) records: Vec<Vec<Value>>,
    pub(crate) dirty: bool,
}

#[derive(Debug)]
struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    fn release(self) -> Result<(), EngineError> {
        let FileLock { path, _file: file } = self;
        drop(file);
        fs::remove_file(&path).map_err(|e| {
            EngineError::unpositioned(
                ErrorCode::Lock,
                format!("failed to release lock {}: {e}", path.display()),
            )
        })
    }
}

/// One unit of work against a repository.
///
/// Holds the resolved flags, the auto-commit switch, the tables modified but not yet
/// committed, and the lock files guarding them.
#[derive(Debug)]
pub struct ExecutionContext {
    pub session: Arc<Session>,
    pub flags: Flags,
    pub auto_commit: bool,
    tables: HashMap<PathBuf, TableState>,
    locks: HashMap<PathBuf, FileLock>,
}

pub(crate) fn interrupted(reason: Interrupted) -> EngineError {
    match reason {
        Interrupted::Cancelled => {
            EngineError::unpositioned(ErrorCode::Cancelled, "context canceled")
        }
        Interrupted::DeadlineExceeded => {
            EngineError::unpositioned(ErrorCode::DeadlineExceeded, "context deadline exceeded")
        }
    }
}

fn positioned(code: ErrorCode, pos: Pos, message: impl Into<String>) -> EngineError {
    EngineError::new(code, pos.line, pos.char, message)
}

impl ExecutionContext {
    #[must_use]
    pub fn new(session: Arc<Session>, flags: Flags) -> Self {
        Self {
            session,
            flags,
            auto_commit: false,
            tables: HashMap::new(),
            locks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn has_uncommitted_changes(&self) -> bool {
        !self.tables.is_empty() || !self.locks.is_empty()
    }

    pub(crate) fn is_stdin(table: &TableRef) -> bool {
        table.name.eq_ignore_ascii_case("stdin")
    }

    /// Repository-relative path of a table; names without an extension get `.csv`.
    #[must_use]
    pub fn table_path(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        let path = if path.extension().is_none() {
            path.with_extension("csv")
        } else {
            path.to_path_buf()
        };
        if path.is_absolute() {
            path
        } else {
            self.flags.repository.join(path)
        }
    }

    /// Snapshot of a table for reading: the uncommitted copy when this unit of work has one.
    pub(crate) fn load_for_read(
        &self,
        ctx: &QueryContext,
        table: &TableRef,
    ) -> Result<View, EngineError> {
        ctx.check().map_err(interrupted)?;
        if Self::is_stdin(table) {
            return self.load_stdin(table);
        }
        let path = self.table_path(&table.name);
        if let Some(state) = self.tables.get(&path) {
            return Ok(View::new(state.header.clone(), state.records.clone()));
        }
        let (header, records) = read_table(&path, table)?;
        Ok(View::new(header, records))
    }

    fn load_stdin(&self, table: &TableRef) -> Result<View, EngineError> {
        let text = self
            .session
            .read_stdin()
            .map_err(|e| positioned(ErrorCode::Io, table.pos, format!("failed to read STDIN: {e}")))?
            .ok_or_else(|| positioned(ErrorCode::FileNotExist, table.pos, "STDIN is empty"))?;
        let (header, records) = csv::read(&text)
            .map_err(|e| positioned(ErrorCode::FieldLength, table.pos, format!("STDIN: {e}")))?;
        Ok(View::new(header, to_values(records)))
    }

    /// Lock a table and return its uncommitted copy, loading it from disk on first use.
    pub(crate) fn load_for_update(
        &mut self,
        ctx: &QueryContext,
        table: &TableRef,
    ) -> Result<&mut TableState, EngineError> {
        if Self::is_stdin(table) {
            return Err(positioned(
                ErrorCode::InvalidValue,
                table.pos,
                "STDIN cannot be updated",
            ));
        }
        let path = self.table_path(&table.name);
        if !self.tables.contains_key(&path) {
            if !path.is_file() {
                return Err(positioned(
                    ErrorCode::FileNotExist,
                    table.pos,
                    format!("file `{}` does not exist", table.name),
                ));
            }
            self.lock(ctx, &path, table)?;
            let (header, records) = read_table(&path, table)?;
            self.tables.insert(
                path.clone(),
                TableState {
                    name: table.name.clone(),
                    header,
                    records,
                    dirty: false,
                },
            );
        }
        self.tables.get_mut(&path).ok_or_else(|| {
            positioned(
                ErrorCode::FileNotExist,
                table.pos,
                format!("file `{}` does not exist", table.name),
            )
        })
    }

    /// Register a new, empty table that will be written on commit.
    pub(crate) fn create_table(
        &mut self,
        ctx: &QueryContext,
        table: &TableRef,
        header: Vec<String>,
    ) -> Result<(), EngineError> {
        let path = self.table_path(&table.name);
        if path.exists() || self.tables.contains_key(&path) {
            return Err(positioned(
                ErrorCode::FileAlreadyExist,
                table.pos,
                format!("file `{}` already exists", table.name),
            ));
        }
        self.lock(ctx, &path, table)?;
        self.tables.insert(
            path,
            TableState {
                name: table.name.clone(),
                header,
                records: Vec::new(),
                dirty: true,
            },
        );
        Ok(())
    }

    fn lock(&mut self, ctx: &QueryContext, path: &Path, table: &TableRef) -> Result<(), EngineError> {
        if self.locks.contains_key(path) {
            return Ok(());
        }
        let lock_path = lock_path(path);
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(file) => {
                    self.locks.insert(
                        path.to_path_buf(),
                        FileLock {
                            path: lock_path,
                            _file: file,
                        },
                    );
                    return Ok(());
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    if started.elapsed() >= self.flags.wait_timeout {
                        return Err(positioned(
                            ErrorCode::Lock,
                            table.pos,
                            format!("file `{}`: lock wait timed out", table.name),
                        ));
                    }
                    ctx.check().map_err(interrupted)?;
                    let mut delay = self.flags.retry_delay;
                    if let Some(remaining) = ctx.remaining() {
                        delay = delay.min(remaining);
                    }
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    return Err(positioned(
                        ErrorCode::Io,
                        table.pos,
                        format!("file `{}`: failed to lock: {e}", table.name),
                    ));
                }
            }
        }
    }

    /// Write every modified table, then release all locks.
    ///
    /// `ctx` is checked before each table write. Tables not yet written when it fires are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns a `Commit` error positioned at `token` when a table cannot be written, or the
    /// interruption. Locks are released regardless.
    pub fn commit(
        &mut self,
        ctx: &QueryContext,
        token: &TransactionControl,
    ) -> Result<(), EngineError> {
        let mut dirty: Vec<_> = std::mem::take(&mut self.tables)
            .into_iter()
            .filter(|(_, state)| state.dirty)
            .collect();
        dirty.sort_by(|a, b| a.0.cmp(&b.0));

        let mut first_error = ctx.check().err().map(interrupted);
        if first_error.is_none() {
            for (path, state) in dirty {
                if let Err(reason) = ctx.check() {
                    first_error = Some(interrupted(reason));
                    break;
                }
                let records: Vec<Vec<String>> = state
                    .records
                    .iter()
                    .map(|r| r.iter().map(Value::to_field).collect())
                    .collect();
                if let Err(e) = fs::write(&path, csv::write(&state.header, &records)) {
                    first_error = Some(positioned(
                        ErrorCode::Commit,
                        token.pos,
                        format!("failed to commit file `{}`: {e}", state.name),
                    ));
                    break;
                }
                self.session
                    .log(&format!("Commit: file \"{}\" is updated.", path.display()));
            }
        }

        let released = self.release_locks();
        match (first_error, released) {
            (Some(e), _) | (None, Err(e)) => Err(e),
            (None, Ok(())) => Ok(()),
        }
    }

    /// Discard uncommitted tables and release all locks.
    ///
    /// Both happen even when `ctx` has already fired; the interruption is reported afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `Rollback` error positioned at `token` when a lock cannot be released, else
    /// the interruption.
    pub fn rollback(
        &mut self,
        ctx: &QueryContext,
        token: &TransactionControl,
    ) -> Result<(), EngineError> {
        let interruption = ctx.check().err();
        let had_changes = self.tables.values().any(|t| t.dirty);
        self.tables.clear();
        self.release_locks().map_err(|e| {
            positioned(ErrorCode::Rollback, token.pos, e.message().to_string())
        })?;
        if let Some(reason) = interruption {
            return Err(interrupted(reason));
        }
        if had_changes {
            self.session.log("Rolled back.");
        }
        Ok(())
    }

    /// Release every held lock, attempting all of them even when some fail.
    ///
    /// # Errors
    ///
    /// Returns one `Lock` error whose message lists every failure, one per line.
    pub fn release_resources(&mut self) -> Result<(), EngineError> {
        self.tables.clear();
        self.release_locks()
    }

    fn release_locks(&mut self) -> Result<(), EngineError> {
        let mut messages = Vec::new();
        let mut locks: Vec<_> = self.locks.drain().collect();
        locks.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, lock) in locks {
            if let Err(e) = lock.release() {
                messages.push(e.message().to_string());
            }
        }
        if messages.is_empty() {
            Ok(())
        } else {
            Err(EngineError::unpositioned(ErrorCode::Lock, messages.join("\n")))
        }
    }
}

/// Lock file guarding a table: `.<file name>.lock` in the same directory.
fn lock_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.lock"))
}

fn read_table(path: &Path, table: &TableRef) -> Result<(Vec<String>, Vec<Vec<Value>>), EngineError> {
    let text = fs::read_to_string(path).map_err(|e| {
        if e.kind() == IoErrorKind::NotFound {
            positioned(
                ErrorCode::FileNotExist,
                table.pos,
                format!("file `{}` does not exist", table.name),
            )
        } else {
            positioned(
                ErrorCode::Io,
                table.pos,
                format!("failed to read file `{}`: {e}", table.name),
            )
        }
    })?;
    let (header, records) = csv::read(&text).map_err(|e| {
        positioned(ErrorCode::FieldLength, table.pos, format!("file `{}`: {e}", table.name))
    })?;
    Ok((header, to_values(records)))
}

fn to_values(records: Vec<Vec<String>>) -> Vec<Vec<Value>> {
    records
        .into_iter()
        .map(|r| r.into_iter().map(Value::String).collect())
        .collect()
}
