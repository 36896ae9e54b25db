#![allow(dead_code)]

use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use csv_sql_middleware::prelude::*;
use tempfile::TempDir;

pub const WAIT_TIMEOUT_FOR_TESTS: Duration = Duration::from_millis(100);

/// Fresh repository holding one copy of the fixture table per name.
pub fn repository(tables: &[&str]) -> Result<TempDir, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/testdata/table.csv");
    for table in tables {
        fs::copy(&fixture, dir.path().join(table))?;
    }
    Ok(dir)
}

pub fn dsn(dir: &TempDir) -> String {
    dir.path().to_string_lossy().into_owned()
}

pub fn ctx() -> QueryContext {
    QueryContext::background().with_timeout(Duration::from_secs(5))
}

/// Scan every row of the active set as `(col1, col2)`.
pub fn scan_rows(rows: &mut Rows) -> Result<Vec<(i64, String)>, CsvMiddlewareError> {
    let mut out = Vec::new();
    let mut dest = vec![RowValues::Null; 2];
    loop {
        match rows.next_row(&mut dest) {
            Ok(()) => out.push(scan_pair(&dest)?),
            Err(CsvMiddlewareError::Exhausted) => return Ok(out),
            Err(e) => return Err(e),
        }
    }
}

pub fn scan_pair(row: &[RowValues]) -> Result<(i64, String), CsvMiddlewareError> {
    let col1 = match &row[0] {
        RowValues::Int(i) => *i,
        RowValues::Text(s) => s
            .parse()
            .map_err(|_| CsvMiddlewareError::Conversion(format!("col1 {s} is not an integer")))?,
        other => {
            return Err(CsvMiddlewareError::Conversion(format!(
                "col1 {other:?} is not an integer"
            )));
        }
    };
    let col2 = row[1]
        .as_text()
        .ok_or_else(|| CsvMiddlewareError::Conversion("col2 is not text".into()))?
        .to_string();
    Ok((col1, col2))
}

pub fn expected(rows: &[(i64, &str)]) -> Vec<(i64, String)> {
    rows.iter().map(|(i, s)| (*i, (*s).to_string())).collect()
}

pub fn select_all(dsn: &str, table: &str) -> Result<Vec<(i64, String)>, Box<dyn Error>> {
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, dsn)?;
    let mut rows = conn.query(
        &ctx,
        &format!("SELECT INTEGER(col1) AS col1, col2 FROM `{table}`"),
        &[],
    )?;
    let result = scan_rows(&mut rows)?;
    rows.close();
    conn.close()?;
    Ok(result)
}

/// In-memory sink that can be installed on a session and read back.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
