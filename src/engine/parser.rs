//! Query text to statements.
//!
//! Tokenizing and grammar come from `sqlparser`; this module lowers its AST into the small
//! statement set the engine evaluates and reports parser failures as positioned syntax errors.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, FromTable, FunctionArg, FunctionArgExpr,
    FunctionArguments, GroupByExpr, Ident, LimitClause, ObjectName, ObjectNamePart, SelectItem,
    SetExpr, Spanned, TableFactor, TableObject, TableWithJoins, UnaryOperator, ValueWithSpan,
};
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::{Parser, ParserError};
use sqlparser::tokenizer::{Location, Token, TokenWithSpan};

use super::error::EngineError;
use super::value::{Ternary, Value};

const RECURSION_LIMIT: usize = 128;

static LOCATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^(.*?)(?: at Line: (\d+), Column:? (\d+))?$")
        .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

static EXPECTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^Expected:? .*?, found: (.*)$")
        .unwrap_or_else(|e| unreachable!("static pattern: {e}"))
});

/// Position of a syntax element in the query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub char: usize,
}

impl Pos {
    /// `None` for the empty location sqlparser gives synthesized tokens.
    fn of(location: Location) -> Option<Self> {
        if location.line == 0 {
            return None;
        }
        Some(Self {
            line: usize::try_from(location.line).unwrap_or(usize::MAX),
            char: usize::try_from(location.column).unwrap_or(usize::MAX),
        })
    }

    /// Position just past the last character of `sql`.
    fn end_of(sql: &str) -> Self {
        let line = sql.matches('\n').count() + 1;
        let tail = sql.rsplit('\n').next().unwrap_or_default();
        Self {
            line,
            char: tail.chars().count() + 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlToken {
    Commit,
    Rollback,
}

/// `COMMIT` / `ROLLBACK`, either written in a query or synthesized by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionControl {
    pub token: ControlToken,
    pub literal: String,
    pub pos: Pos,
}

impl TransactionControl {
    #[must_use]
    pub fn new(token: ControlToken, literal: impl Into<String>, line: usize, char: usize) -> Self {
        Self {
            token,
            literal: literal.into(),
            pos: Pos { line, char },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    /// `?`, numbered from 1 across the whole query text.
    Ordinal(usize),
    /// `:name`
    Named(String),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Ordinal(n) => write!(f, "?{n}"),
            Placeholder::Named(name) => write!(f, ":{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn from_binary(op: &BinaryOperator) -> Option<Self> {
        let op = match op {
            BinaryOperator::Eq => CompareOp::Eq,
            BinaryOperator::NotEq => CompareOp::NotEq,
            BinaryOperator::Lt => CompareOp::Lt,
            BinaryOperator::LtEq => CompareOp::LtEq,
            BinaryOperator::Gt => CompareOp::Gt,
            BinaryOperator::GtEq => CompareOp::GtEq,
            _ => return None,
        };
        Some(op)
    }

    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column { name: String, pos: Pos },
    Placeholder { placeholder: Placeholder, pos: Pos },
    Function { name: String, args: Vec<Expr>, pos: Pos },
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    Concat { left: Box<Expr>, right: Box<Expr> },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    Like { expr: Box<Expr>, pattern: Box<Expr>, negated: bool },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "'{s}'"),
            Expr::Literal(v) => f.write_str(&v.to_text().unwrap_or_else(|| "NULL".into())),
            Expr::Column { name, .. } => f.write_str(name),
            Expr::Placeholder { placeholder, .. } => write!(f, "{placeholder}"),
            Expr::Function { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Expr::Compare { op, left, right } => write!(f, "{left} {} {right}", op.as_str()),
            Expr::Concat { left, right } => write!(f, "{left} || {right}"),
            Expr::And(l, r) => write!(f, "{l} AND {r}"),
            Expr::Or(l, r) => write!(f, "{l} OR {r}"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::Like { expr, pattern, negated } => {
                write!(f, "{expr} {}LIKE {pattern}", if *negated { "NOT " } else { "" })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectField {
    All,
    Expr { expr: Expr, alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub fields: Vec<SelectField>,
    pub from: Option<TableRef>,
    pub where_clause: Option<Expr>,
    pub limit: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertQuery {
    pub table: TableRef,
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateQuery {
    pub table: TableRef,
    pub set: Vec<(String, Pos, Expr)>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteQuery {
    pub table: TableRef,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: TableRef,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
    CreateTable(CreateTable),
    TransactionControl(TransactionControl),
}

/// Parse result: the statement list plus the placeholders it references.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedQuery {
    pub statements: Vec<Statement>,
    /// Number of `?` placeholders.
    pub ordinal_count: usize,
    /// Distinct `:name` placeholders in order of first appearance.
    pub names: Vec<String>,
}

/// Options that change how query text is tokenized.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub ansi_quotes: bool,
}

/// Backquotes always delimit identifiers; double quotes do only in ANSI mode and otherwise
/// delimit strings, as single quotes do.
#[derive(Debug)]
struct CsvqDialect {
    ansi_quotes: bool,
}

impl Dialect for CsvqDialect {
    fn is_identifier_start(&self, ch: char) -> bool {
        ch.is_alphabetic() || ch == '_'
    }

    fn is_identifier_part(&self, ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_'
    }

    fn is_delimited_identifier_start(&self, ch: char) -> bool {
        ch == '`' || (self.ansi_quotes && ch == '"')
    }

    fn supports_string_literal_backslash_escape(&self) -> bool {
        true
    }
}

/// Parse query text into a list of statements separated by `;`.
///
/// # Errors
///
/// Returns a syntax error positioned at the offending token.
pub fn parse(sql: &str, options: ParseOptions) -> Result<ParsedQuery, EngineError> {
    let dialect = CsvqDialect {
        ansi_quotes: options.ansi_quotes,
    };
    let mut lower = Lower {
        sql,
        start: Pos { line: 1, char: 1 },
        ordinal_count: 0,
        names: Vec::new(),
    };
    let mut parser = Parser::new(&dialect)
        .with_recursion_limit(RECURSION_LIMIT)
        .try_with_sql(sql)
        .map_err(|e| lower.parser_error(&e))?;
    let mut statements = Vec::new();
    loop {
        while parser.consume_token(&Token::SemiColon) {}
        let start = parser.peek_token();
        if start.token == Token::EOF {
            break;
        }
        lower.start = Pos::of(start.span.start).unwrap_or(lower.start);
        statements.push(lower.statement(&mut parser, &start)?);
        let next = parser.peek_token();
        match next.token {
            Token::SemiColon | Token::EOF => {}
            _ => return Err(lower.unexpected(&next)),
        }
    }
    Ok(ParsedQuery {
        statements,
        ordinal_count: lower.ordinal_count,
        names: lower.names,
    })
}

/// Words that cannot stand alone as a column reference.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "LIMIT", "INSERT", "INTO", "VALUES", "UPDATE", "SET", "DELETE",
    "CREATE", "AS", "AND", "OR", "NOT", "IS", "LIKE",
];

/// Lowers sqlparser statements, numbering `?` placeholders in text order.
struct Lower<'a> {
    sql: &'a str,
    /// Start of the statement being lowered; fallback for nodes without a span.
    start: Pos,
    ordinal_count: usize,
    names: Vec<String>,
}

impl Lower<'_> {
    fn statement(
        &mut self,
        parser: &mut Parser<'_>,
        start: &TokenWithSpan,
    ) -> Result<Statement, EngineError> {
        let Token::Word(word) = &start.token else {
            return Err(self.unexpected(start));
        };
        match word.keyword {
            Keyword::COMMIT | Keyword::ROLLBACK => {
                parser.next_token();
                let token = if word.keyword == Keyword::COMMIT {
                    ControlToken::Commit
                } else {
                    ControlToken::Rollback
                };
                return Ok(Statement::TransactionControl(TransactionControl::new(
                    token,
                    word.value.clone(),
                    self.start.line,
                    self.start.char,
                )));
            }
            Keyword::CREATE => return self.create_table(parser).map(Statement::CreateTable),
            Keyword::SELECT => {
                let first = parser.peek_nth_token_ref(1);
                if let Token::Word(w) = &first.token
                    && matches!(w.keyword, Keyword::FROM | Keyword::WHERE)
                {
                    return Err(self.unexpected(first));
                }
            }
            _ => {}
        }
        let statement = parser
            .parse_statement()
            .map_err(|e| self.parser_error(&e))?;
        match statement {
            ast::Statement::Query(query) => self.select(*query).map(Statement::Select),
            ast::Statement::Insert(insert) => self.insert(insert).map(Statement::Insert),
            ast::Statement::Update(ast::Update {
                table,
                assignments,
                from,
                selection,
                ..
            }) => {
                if from.is_some() {
                    return Err(self.unsupported(self.start, "UPDATE ... FROM"));
                }
                let table = self.table_with_joins(table)?;
                let mut set = Vec::with_capacity(assignments.len());
                for assignment in assignments {
                    let AssignmentTarget::ColumnName(column) = &assignment.target else {
                        return Err(self.unsupported(self.start, "tuple assignment"));
                    };
                    let Some(ident) = identifiers(column).last().copied() else {
                        return Err(self.unsupported(self.start, "assignment target"));
                    };
                    let pos = self.pos_of(ident.span.start);
                    let value = self.expr(assignment.value)?;
                    set.push((ident.value.clone(), pos, value));
                }
                let where_clause = selection.map(|e| self.expr(e)).transpose()?;
                Ok(Statement::Update(UpdateQuery {
                    table,
                    set,
                    where_clause,
                }))
            }
            ast::Statement::Delete(delete) => {
                if delete.using.is_some() || !delete.tables.is_empty() {
                    return Err(self.unsupported(self.start, "multi-table DELETE"));
                }
                let (FromTable::WithFromKeyword(mut tables)
                | FromTable::WithoutKeyword(mut tables)) = delete.from;
                if tables.len() != 1 {
                    return Err(self.unsupported(self.start, "multi-table DELETE"));
                }
                let table = self.table_with_joins(tables.remove(0))?;
                let where_clause = delete.selection.map(|e| self.expr(e)).transpose()?;
                Ok(Statement::Delete(DeleteQuery {
                    table,
                    where_clause,
                }))
            }
            _ => Err(self.unexpected(start)),
        }
    }

    /// `CREATE TABLE name (column, ...)`: columns carry no types.
    fn create_table(&self, parser: &mut Parser<'_>) -> Result<CreateTable, EngineError> {
        let (name, columns) = create_table_parts(parser).map_err(|e| self.parser_error(&e))?;
        Ok(CreateTable {
            table: self.table_name(&name)?,
            columns: columns.into_iter().map(|c| c.value).collect(),
        })
    }

    fn select(&mut self, query: ast::Query) -> Result<SelectQuery, EngineError> {
        if query.with.is_some() {
            return Err(self.unsupported(self.start, "WITH clause"));
        }
        if query.order_by.is_some() {
            return Err(self.unsupported(self.start, "ORDER BY clause"));
        }
        if query.fetch.is_some() || !query.locks.is_empty() {
            return Err(self.unsupported(self.start, "query clause"));
        }
        let limit = match query.limit_clause {
            None => None,
            Some(LimitClause::LimitOffset {
                limit,
                offset: None,
                limit_by,
                ..
            }) if limit_by.is_empty() => limit,
            Some(_) => return Err(self.unsupported(self.start, "OFFSET clause")),
        };
        let SetExpr::Select(select) = *query.body else {
            return Err(self.unsupported(self.start, "compound query"));
        };
        let select = *select;
        if select.distinct.is_some() || select.top.is_some() || select.into.is_some() {
            return Err(self.unsupported(self.start, "SELECT modifier"));
        }
        if !matches!(&select.group_by, GroupByExpr::Expressions(exprs, _) if exprs.is_empty())
            || select.having.is_some()
        {
            return Err(self.unsupported(self.start, "aggregation"));
        }

        let mut fields = Vec::with_capacity(select.projection.len());
        for item in select.projection {
            let field = match item {
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => SelectField::All,
                SelectItem::UnnamedExpr(expr) => SelectField::Expr {
                    expr: self.expr(expr)?,
                    alias: None,
                },
                SelectItem::ExprWithAlias { expr, alias } => SelectField::Expr {
                    expr: self.expr(expr)?,
                    alias: Some(alias.value),
                },
            };
            fields.push(field);
        }
        let mut from = select.from;
        let from = match from.len() {
            0 => None,
            1 => Some(self.table_with_joins(from.remove(0))?),
            _ => return Err(self.unsupported(self.start, "multiple tables")),
        };
        let where_clause = select.selection.map(|e| self.expr(e)).transpose()?;
        let limit = limit.map(|e| self.expr(e)).transpose()?;
        Ok(SelectQuery {
            fields,
            from,
            where_clause,
            limit,
        })
    }

    fn insert(&mut self, insert: ast::Insert) -> Result<InsertQuery, EngineError> {
        let TableObject::TableName(name) = &insert.table else {
            return Err(self.unsupported(self.start, "INSERT target"));
        };
        let table = self.table_name(name)?;
        let columns = if insert.columns.is_empty() {
            None
        } else {
            Some(insert.columns.into_iter().map(|c| c.value).collect())
        };
        let Some(source) = insert.source else {
            return Err(self.unsupported(self.start, "INSERT without VALUES"));
        };
        let SetExpr::Values(values) = *source.body else {
            return Err(self.unsupported(self.start, "INSERT ... SELECT"));
        };
        let mut rows = Vec::with_capacity(values.rows.len());
        for row in values.rows {
            let row = row
                .into_iter()
                .map(|e| self.expr(e))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(row);
        }
        Ok(InsertQuery {
            table,
            columns,
            rows,
        })
    }

    fn table_with_joins(&self, table: TableWithJoins) -> Result<TableRef, EngineError> {
        if !table.joins.is_empty() {
            return Err(self.unsupported(self.start, "JOIN"));
        }
        match &table.relation {
            TableFactor::Table { name, .. } => self.table_name(name),
            _ => Err(self.unsupported(self.start, "table expression")),
        }
    }

    /// Dotted parts join back into a file name, so `table.csv` names the file it spells.
    fn table_name(&self, name: &ObjectName) -> Result<TableRef, EngineError> {
        let parts = identifiers(name);
        let Some(first) = parts.first() else {
            return Err(self.unsupported(self.start, "table name"));
        };
        Ok(TableRef {
            name: parts
                .iter()
                .map(|ident| ident.value.as_str())
                .collect::<Vec<_>>()
                .join("."),
            pos: self.pos_of(first.span.start),
        })
    }

    fn expr(&mut self, expr: ast::Expr) -> Result<Expr, EngineError> {
        let pos = self.pos_of(expr.span().start);
        let lowered = match expr {
            ast::Expr::Identifier(ident) => self.column(&ident)?,
            ast::Expr::CompoundIdentifier(parts) => match parts.last() {
                // `alias.column`: only the column part is significant
                Some(last) => Expr::Column {
                    name: last.value.clone(),
                    pos,
                },
                None => return Err(self.unsupported(pos, "identifier")),
            },
            ast::Expr::Value(value) => self.value(value)?,
            ast::Expr::Nested(inner) => self.expr(*inner)?,
            ast::Expr::BinaryOp { left, op, right } => {
                let left = Box::new(self.expr(*left)?);
                let right = Box::new(self.expr(*right)?);
                match op {
                    BinaryOperator::And => Expr::And(left, right),
                    BinaryOperator::Or => Expr::Or(left, right),
                    BinaryOperator::StringConcat => Expr::Concat { left, right },
                    other => match CompareOp::from_binary(&other) {
                        Some(op) => Expr::Compare { op, left, right },
                        None => return Err(self.unsupported(pos, &format!("operator {other}"))),
                    },
                }
            }
            ast::Expr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => Expr::Not(Box::new(self.expr(*expr)?)),
                UnaryOperator::Plus => self.expr(*expr)?,
                UnaryOperator::Minus => match self.expr(*expr)? {
                    Expr::Literal(Value::Integer(i)) => Expr::Literal(Value::Integer(-i)),
                    Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                    _ => return Err(self.unsupported(pos, "operator -")),
                },
                other => return Err(self.unsupported(pos, &format!("operator {other}"))),
            },
            ast::Expr::IsNull(inner) => Expr::IsNull {
                expr: Box::new(self.expr(*inner)?),
                negated: false,
            },
            ast::Expr::IsNotNull(inner) => Expr::IsNull {
                expr: Box::new(self.expr(*inner)?),
                negated: true,
            },
            ast::Expr::Like {
                negated,
                expr,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(self.unsupported(pos, "LIKE ... ESCAPE"));
                }
                Expr::Like {
                    expr: Box::new(self.expr(*expr)?),
                    pattern: Box::new(self.expr(*pattern)?),
                    negated,
                }
            }
            ast::Expr::Trim {
                expr,
                trim_where,
                trim_what,
                ..
            } if trim_where.is_none() && trim_what.is_none() => Expr::Function {
                name: "TRIM".into(),
                args: vec![self.expr(*expr)?],
                pos,
            },
            ast::Expr::Function(function) => {
                let Some(ident) = identifiers(&function.name).last().copied() else {
                    return Err(self.unsupported(pos, "function name"));
                };
                let name = ident.value.to_ascii_uppercase();
                let args = match function.args {
                    FunctionArguments::None => Vec::new(),
                    FunctionArguments::List(list) => {
                        let mut args = Vec::with_capacity(list.args.len());
                        for arg in list.args {
                            let FunctionArg::Unnamed(FunctionArgExpr::Expr(arg)) = arg else {
                                return Err(self.unsupported(pos, "function argument"));
                            };
                            args.push(self.expr(arg)?);
                        }
                        args
                    }
                    FunctionArguments::Subquery(_) => {
                        return Err(self.unsupported(pos, "subquery"));
                    }
                };
                Expr::Function { name, args, pos }
            }
            other => return Err(self.unsupported(pos, &format!("expression {other}"))),
        };
        Ok(lowered)
    }

    fn column(&self, ident: &Ident) -> Result<Expr, EngineError> {
        let pos = self.pos_of(ident.span.start);
        if ident.quote_style.is_none() {
            if ident.value.eq_ignore_ascii_case("UNKNOWN") {
                return Ok(Expr::Literal(Value::Ternary(Ternary::Unknown)));
            }
            if RESERVED.iter().any(|w| ident.value.eq_ignore_ascii_case(w)) {
                return Err(EngineError::syntax(
                    pos.line,
                    pos.char,
                    format!("unexpected token \"{}\"", ident.value),
                ));
            }
        }
        Ok(Expr::Column {
            name: ident.value.clone(),
            pos,
        })
    }

    fn value(&mut self, value: ValueWithSpan) -> Result<Expr, EngineError> {
        let pos = self.pos_of(value.span.start);
        let expr = match value.value {
            ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Expr::Literal(Value::Integer(i))
                } else if let Ok(f) = n.parse::<f64>() {
                    Expr::Literal(Value::Float(f))
                } else {
                    return Err(EngineError::syntax(
                        pos.line,
                        pos.char,
                        format!("unexpected token \"{n}\""),
                    ));
                }
            }
            ast::Value::SingleQuotedString(s) | ast::Value::DoubleQuotedString(s) => {
                Expr::Literal(Value::String(s))
            }
            ast::Value::Boolean(true) => Expr::Literal(Value::Ternary(Ternary::True)),
            ast::Value::Boolean(false) => Expr::Literal(Value::Ternary(Ternary::False)),
            ast::Value::Null => Expr::Literal(Value::Null),
            ast::Value::Placeholder(p) if p == "?" => {
                self.ordinal_count += 1;
                Expr::Placeholder {
                    placeholder: Placeholder::Ordinal(self.ordinal_count),
                    pos,
                }
            }
            ast::Value::Placeholder(p) if p.len() > 1 && p.starts_with(':') => {
                let name = p[1..].to_string();
                if !self.names.contains(&name) {
                    self.names.push(name.clone());
                }
                Expr::Placeholder {
                    placeholder: Placeholder::Named(name),
                    pos,
                }
            }
            other => {
                return Err(EngineError::syntax(
                    pos.line,
                    pos.char,
                    format!("unexpected token \"{other}\""),
                ));
            }
        };
        Ok(expr)
    }

    fn pos_of(&self, location: Location) -> Pos {
        Pos::of(location).unwrap_or(self.start)
    }

    fn unsupported(&self, pos: Pos, what: &str) -> EngineError {
        EngineError::syntax(pos.line, pos.char, format!("unsupported {what}"))
    }

    fn unexpected(&self, token: &TokenWithSpan) -> EngineError {
        match &token.token {
            Token::EOF => {
                let end = Pos::end_of(self.sql);
                EngineError::syntax(end.line, end.char, "unexpected termination")
            }
            other => {
                let pos = self.pos_of(token.span.start);
                EngineError::syntax(pos.line, pos.char, format!("unexpected token \"{other}\""))
            }
        }
    }

    /// Rewrites a sqlparser failure as `unexpected token "X"` at the reported location.
    fn parser_error(&self, err: &ParserError) -> EngineError {
        let text = match err {
            ParserError::TokenizerError(text) | ParserError::ParserError(text) => text.as_str(),
            ParserError::RecursionLimitExceeded => {
                return EngineError::syntax(
                    self.start.line,
                    self.start.char,
                    "expression is nested too deeply",
                );
            }
        };
        let Some(caps) = LOCATED.captures(text) else {
            return EngineError::syntax(self.start.line, self.start.char, text);
        };
        let message = caps.get(1).map_or(text, |m| m.as_str());
        let located = caps
            .get(2)
            .zip(caps.get(3))
            .and_then(|(l, c)| Some((l.as_str().parse().ok()?, c.as_str().parse().ok()?)));
        let found = EXPECTED
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str());
        match (found, located) {
            (Some("EOF"), _) => {
                let end = Pos::end_of(self.sql);
                EngineError::syntax(end.line, end.char, "unexpected termination")
            }
            (Some(found), Some((line, char))) => {
                EngineError::syntax(line, char, format!("unexpected token \"{found}\""))
            }
            (None, Some((line, char))) => EngineError::syntax(line, char, message),
            (_, None) => {
                let end = Pos::end_of(self.sql);
                EngineError::syntax(end.line, end.char, message)
            }
        }
    }
}

fn create_table_parts(parser: &mut Parser<'_>) -> Result<(ObjectName, Vec<Ident>), ParserError> {
    parser.expect_keywords(&[Keyword::CREATE, Keyword::TABLE])?;
    let name = parser.parse_object_name(false)?;
    parser.expect_token(&Token::LParen)?;
    let columns = parser.parse_comma_separated(|p| p.parse_identifier())?;
    parser.expect_token(&Token::RParen)?;
    Ok((name, columns))
}

fn identifiers(name: &ObjectName) -> Vec<&Ident> {
    name.0
        .iter()
        .filter_map(|part| match part {
            ObjectNamePart::Identifier(ident) => Some(ident),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ErrorCode;

    fn parse_ok(sql: &str) -> ParsedQuery {
        parse(sql, ParseOptions::default()).expect("parse")
    }

    fn first_select(parsed: &ParsedQuery) -> &SelectQuery {
        let Statement::Select(select) = &parsed.statements[0] else {
            panic!("expected select");
        };
        select
    }

    #[test]
    fn select_without_fields_reports_from_token() {
        let err = parse("SELECT FROM `notexist.csv`", ParseOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "[L:1 C:8] syntax error: unexpected token \"FROM\"");
    }

    #[test]
    fn update_without_set_reports_where_token() {
        let err = parse("UPDATE `table_u.csv` WHERE col1 = 2", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Syntax);
        assert_eq!((err.line(), err.char()), (1, 22));
        assert!(err.message().contains("WHERE"), "{err}");
    }

    #[test]
    fn update_keeps_each_assignment_position() {
        let parsed = parse_ok("UPDATE t SET a = 1, b = 'x' WHERE c = 2");
        let Statement::Update(update) = &parsed.statements[0] else {
            panic!("expected update");
        };
        assert_eq!(update.table.name, "t");
        let names: Vec<_> = update.set.iter().map(|(name, _, _)| name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(update.set[1].1, Pos { line: 1, char: 21 });
        assert_eq!(update.set[1].2, Expr::Literal(Value::String("x".into())));
        assert!(update.where_clause.is_some());
    }

    #[test]
    fn bare_table_names_keep_their_extension() {
        let parsed = parse_ok("SELECT INTEGER(col1) AS col1, col2 FROM users.csv");
        let select = first_select(&parsed);
        assert_eq!(select.from.as_ref().map(|t| t.name.as_str()), Some("users.csv"));
        assert_eq!(select.from.as_ref().map(|t| t.pos), Some(Pos { line: 1, char: 41 }));
        assert_eq!(select.fields.len(), 2);
    }

    #[test]
    fn backquoted_and_stdin_tables() {
        let parsed = parse_ok("DELETE FROM `dir.d/t.csv` WHERE id = 1; SELECT * FROM STDIN");
        let Statement::Delete(delete) = &parsed.statements[0] else {
            panic!("expected delete");
        };
        assert_eq!(delete.table.name, "dir.d/t.csv");
        let select = match &parsed.statements[1] {
            Statement::Select(select) => select,
            other => panic!("expected select, got {other:?}"),
        };
        assert_eq!(select.from.as_ref().map(|t| t.name.as_str()), Some("STDIN"));
        assert_eq!(select.fields, vec![SelectField::All]);
    }

    #[test]
    fn placeholders_are_counted_across_statements() {
        let parsed = parse_ok("SELECT ? ; SELECT :id, ?, :id");
        assert_eq!(parsed.statements.len(), 2);
        assert_eq!(parsed.ordinal_count, 2);
        assert_eq!(parsed.names, vec!["id".to_string()]);
    }

    #[test]
    fn multi_row_insert_and_transaction_control() {
        let parsed = parse_ok("INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y'); commit");
        let Statement::Insert(insert) = &parsed.statements[0] else {
            panic!("expected insert");
        };
        assert_eq!(insert.columns, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(insert.rows.len(), 2);
        let Statement::TransactionControl(control) = &parsed.statements[1] else {
            panic!("expected transaction control");
        };
        assert_eq!(control.token, ControlToken::Commit);
        assert_eq!(control.literal, "commit");
        assert_eq!(control.pos, Pos { line: 1, char: 49 });
    }

    #[test]
    fn create_table_takes_untyped_columns() {
        let parsed = parse_ok("CREATE TABLE log (id, at)");
        let Statement::CreateTable(create) = &parsed.statements[0] else {
            panic!("expected create table");
        };
        assert_eq!(create.table.name, "log");
        assert_eq!(create.columns, ["id", "at"]);
    }

    #[test]
    fn function_names_render_in_column_headers() {
        let parsed = parse_ok("SELECT integer(col1), trim(col2)");
        let rendered: Vec<String> = first_select(&parsed)
            .fields
            .iter()
            .map(|field| match field {
                SelectField::Expr { expr, .. } => expr.to_string(),
                SelectField::All => "*".into(),
            })
            .collect();
        assert_eq!(rendered, ["INTEGER(col1)", "TRIM(col2)"]);
    }

    #[test]
    fn literals_cover_ternary_and_signed_numbers() {
        let parsed = parse_ok("SELECT -1, 2.5, UNKNOWN, NOT TRUE, NULL");
        let exprs: Vec<&Expr> = first_select(&parsed)
            .fields
            .iter()
            .filter_map(|field| match field {
                SelectField::Expr { expr, .. } => Some(expr),
                SelectField::All => None,
            })
            .collect();
        assert_eq!(exprs[0], &Expr::Literal(Value::Integer(-1)));
        assert_eq!(exprs[1], &Expr::Literal(Value::Float(2.5)));
        assert_eq!(exprs[2], &Expr::Literal(Value::Ternary(Ternary::Unknown)));
        assert_eq!(
            exprs[3],
            &Expr::Not(Box::new(Expr::Literal(Value::Ternary(Ternary::True))))
        );
        assert_eq!(exprs[4], &Expr::Literal(Value::Null));
    }

    #[test]
    fn double_quotes_follow_ansi_flag() {
        let parsed = parse_ok("SELECT \"a\"");
        let SelectField::Expr { expr, .. } = &first_select(&parsed).fields[0] else {
            panic!("expected expression field");
        };
        assert_eq!(expr, &Expr::Literal(Value::String("a".into())));

        let parsed = parse("SELECT \"a\"", ParseOptions { ansi_quotes: true }).expect("parse");
        let SelectField::Expr { expr, .. } = &first_select(&parsed).fields[0] else {
            panic!("expected expression field");
        };
        assert!(matches!(expr, Expr::Column { name, .. } if name == "a"));
    }

    #[test]
    fn comments_are_skipped() {
        let parsed = parse_ok("SELECT 1 -- one\n;\n/* two */ SELECT 2");
        assert_eq!(parsed.statements.len(), 2);
    }

    #[test]
    fn where_clause_lowers_to_engine_operators() {
        let parsed =
            parse_ok("SELECT * FROM t WHERE a <> 1 AND (b IS NOT NULL OR c NOT LIKE 'x%') LIMIT 3");
        let select = first_select(&parsed);
        let Some(Expr::And(left, right)) = &select.where_clause else {
            panic!("expected conjunction, got {:?}", select.where_clause);
        };
        assert!(matches!(**left, Expr::Compare { op: CompareOp::NotEq, .. }));
        let Expr::Or(is_null, like) = &**right else {
            panic!("expected disjunction");
        };
        assert!(matches!(**is_null, Expr::IsNull { negated: true, .. }));
        assert!(matches!(**like, Expr::Like { negated: true, .. }));
        assert_eq!(select.limit, Some(Expr::Literal(Value::Integer(3))));
    }

    #[test]
    fn statements_outside_the_dialect_are_rejected() {
        let err = parse("DROP TABLE t", ParseOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "[L:1 C:1] syntax error: unexpected token \"DROP\"");

        let err = parse("SELECT a FROM t ORDER BY a", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Syntax);
    }

    #[test]
    fn unterminated_literal_is_a_syntax_error() {
        let err = parse("SELECT 'abc", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Syntax);
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn early_termination_is_reported_at_end_of_text() {
        let err = parse("SELECT a FROM t WHERE\n  a =", ParseOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "[L:2 C:6] syntax error: unexpected termination");
    }

    #[test]
    fn missing_terminator_between_statements_is_an_error() {
        let err = parse("SELECT 1 SELECT 2", ParseOptions::default()).unwrap_err();
        assert_eq!(err.line(), 1);
        assert_eq!(err.char(), 10);
    }
}
