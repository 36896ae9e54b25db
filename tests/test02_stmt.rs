mod common;

use std::error::Error;

use common::{ctx, dsn, expected, repository, scan_rows, select_all};
use csv_sql_middleware::prelude::*;

#[test]
fn prepare_reports_syntax_errors() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table_sq.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let err = conn.prepare(&ctx, "SELECT FROM `table_sq.csv`").unwrap_err();
    assert_eq!(err.to_string(), "[L:1 C:8] syntax error: unexpected token \"FROM\"");
    Ok(())
}

#[test]
fn unsupported_argument_leaves_statement_reusable() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table_q.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let mut stmt = conn.prepare(
        &ctx,
        "SELECT INTEGER(col1) AS col1, col2 FROM `table_q.csv` WHERE col1 = ?",
    )?;
    assert_eq!(stmt.num_input(), 1);

    let err = stmt.query(&ctx, &[arg(vec![1_i32, 2])]).unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::Conversion(_)));
    assert!(err.to_string().starts_with("unsupported type: "), "{err}");
    assert!(err.to_string().contains("Vec<i32>"), "{err}");

    let mut rows = stmt.query(&ctx, &[arg(1_i32)])?;
    assert_eq!(scan_rows(&mut rows)?, expected(&[(1, "str1")]));
    rows.close();

    let mut rows = stmt.query(&ctx, &[arg(3_u8)])?;
    assert_eq!(scan_rows(&mut rows)?, expected(&[(3, "str3")]));
    Ok(())
}

#[test]
fn named_arguments_fill_named_placeholders() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table_sq.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let mut stmt = conn.prepare(
        &ctx,
        "SELECT INTEGER(col1) AS col1, col2 FROM `table_sq.csv` WHERE col1 = :id",
    )?;
    let mut rows = stmt.query(&ctx, &[named("id", 2_i64)])?;
    assert_eq!(scan_rows(&mut rows)?, expected(&[(2, "str2")]));

    let err = stmt.query(&ctx, &[named("other", 2_i64)]).unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::Binding(_)));
    assert!(err.is_usage_error());
    Ok(())
}

#[test]
fn exec_with_named_argument_for_question_mark() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table_su.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let mut stmt = conn.prepare(
        &ctx,
        "UPDATE `table_su.csv` SET col2 = 'updated' WHERE col1 = ?",
    )?;
    let result = stmt.exec(&ctx, &[named("id", 2_i32)])?;
    assert_eq!(result.rows_affected(), 1);
    stmt.close();

    assert_eq!(
        select_all(&dsn(&dir), "table_su.csv")?,
        expected(&[(1, "str1"), (2, "updated"), (3, "str3")])
    );
    Ok(())
}

#[test]
fn closed_statement_cannot_run() -> Result<(), Box<dyn Error>> {
    let dir = repository(&["table.csv"])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;

    let mut stmt = conn.prepare(&ctx, "SELECT col2 FROM `table.csv`")?;
    assert_eq!(stmt.sql(), "SELECT col2 FROM `table.csv`");
    stmt.close();
    stmt.close();
    let err = stmt.query(&ctx, &[]).unwrap_err();
    assert!(matches!(err, CsvMiddlewareError::StatementClosed));
    Ok(())
}

#[test]
fn insert_through_a_prepared_statement_with_many_rows() -> Result<(), Box<dyn Error>> {
    let dir = repository(&[])?;
    let ctx = ctx();
    let mut conn = Connection::open(&ctx, &dsn(&dir))?;
    conn.exec(&ctx, "CREATE TABLE bulk (column1, column2)", &[])?;

    let mut stmt = conn.prepare(&ctx, "INSERT INTO bulk (column1, column2) VALUES (?, ?), (?, ?)")?;
    assert_eq!(stmt.num_input(), 4);
    for n in 0..3 {
        let res = stmt.exec(
            &ctx,
            &[
                arg(format!("a{n}")),
                arg(format!("b{n}")),
                arg(Some(n)),
                arg(None::<i64>),
            ],
        )?;
        assert_eq!(res.rows_affected(), 2);
    }

    let mut rows = conn.query(&ctx, "SELECT column1 FROM bulk WHERE column2 = ''", &[])?;
    let result = rows.fetch_all();
    assert_eq!(result.len(), 3);
    Ok(())
}
