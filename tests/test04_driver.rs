mod common;

use std::error::Error;
use std::time::Duration;

use common::{WAIT_TIMEOUT_FOR_TESTS, ctx, dsn, repository};
use csv_sql_middleware::prelude::*;

#[test]
fn open_rejects_a_missing_repository() -> Result<(), Box<dyn Error>> {
    let dir = repository(&[])?;
    let ctx = ctx();
    let missing = dir.path().join("notexistdir");

    let err = Connection::open(&ctx, &missing.to_string_lossy()).unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::BadConnection));
    assert_eq!(err.to_string(), "driver: bad connection");

    let err = Driver::default()
        .open(&ctx, &format!("{}?IncorrectParam=true", dsn(&dir)))
        .unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::BadConnection));

    let err = Connection::open(&ctx, &format!("{}?timezone=Nowhere/Special", dsn(&dir))).unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::BadConnection));
    Ok(())
}

#[test]
fn ping_and_close() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table.csv"])?;
    let ctx = ctx();
    let connector = Driver::default().open_connector(&format!("{}?timezone=UTC&ansiquotes=1", dsn(&dir)));
    let mut conn = connector.connect(&ctx)?;
    assert_eq!(conn.dsn().timezone(), "UTC");
    assert!(conn.dsn().ansi_quotes());

    conn.ping(&ctx)?;
    conn.close()?;
    assert!(conn.is_closed());
    conn.close()?;

    assert!(matches!(conn.ping(&ctx), Err(CsvMiddlewareError::BadConnection)));
    assert!(matches!(
        conn.query(&ctx, "SELECT col1 FROM \"table.csv\"", &[]),
        Err(CsvMiddlewareError::BadConnection)
    ));
    Ok(())
}

#[test]
fn ping_fails_once_the_repository_is_gone() -> Result<(), Box<dyn Error>> {
    let dir = repository(&[])?;
    let ctx = ctx();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo)?;

    let conn = Connection::open(&ctx, &repo.to_string_lossy())?;
    conn.ping(&ctx)?;
    std::fs::remove_dir(&repo)?;
    assert!(matches!(conn.ping(&ctx), Err(CsvMiddlewareError::BadConnection)));
    Ok(())
}

#[test]
fn ansi_quotes_change_double_quoted_text_to_identifiers() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table.csv"])?;
    let ctx = ctx();

    let mut conn = Connection::open(&ctx, &format!("{}?AnsiQuotes=true", dsn(&dir)))?;
    let row = conn.query_row(&ctx, "SELECT \"col2\" FROM \"table.csv\" WHERE col1 = 1", &[])?;
    assert_eq!(row, vec![RowValues::Text("str1".into())]);

    let mut plain = Connection::open(&ctx, &dsn(&dir))?;
    let row = plain.query_row(&ctx, "SELECT \"col2\" FROM `table.csv` WHERE col1 = 1", &[])?;
    assert_eq!(row, vec![RowValues::Text("col2".into())]);
    Ok(())
}

#[test]
fn second_writer_times_out_waiting_for_the_lock() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table.csv"])?;
    let ctx = ctx();

    let mut first = Connection::open(&ctx, &dsn(&dir))?;
    let mut second = CsvqOptionsBuilder::new(dsn(&dir))
        .wait_timeout(WAIT_TIMEOUT_FOR_TESTS)
        .retry_delay(Duration::from_millis(5))
        .open(&ctx)?;

    let mut tx = first.begin(&ctx)?;
    tx.exec(&ctx, "UPDATE `table.csv` SET col2 = 'a' WHERE col1 = 1", &[])?;

    let err = second
        .exec(&ctx, "UPDATE `table.csv` SET col2 = 'b' WHERE col1 = 1", &[])
        .unwrap_err();
    assert_eq!(
        err.engine_error().map(EngineError::code),
        Some(ErrorCode::Lock)
    );

    tx.commit(&ctx)?;
    drop(tx);
    let res = second.exec(&ctx, "UPDATE `table.csv` SET col2 = 'b' WHERE col1 = 1", &[])?;
    assert_eq!(res.rows_affected(), 1);
    Ok(())
}

#[test]
fn statement_outlives_its_transaction() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let mut stmt = {
        let mut tx = conn.begin(&ctx)?;
        let stmt = tx.prepare(&ctx, "DELETE FROM `table.csv` WHERE col1 = ?")?;
        tx.rollback(&ctx)?;
        stmt
    };
    // back in auto-commit mode, so the delete is written immediately
    let res = stmt.exec(&ctx, &[arg(1_i64)])?;
    assert_eq!(res.rows_affected(), 1);
    assert!(!dir.path().join(".table.csv.lock").exists());
    assert_eq!(common::select_all(&dsn(&dir), "table.csv")?.len(), 2);

    conn.close()?;
    Ok(())
}
