use std::cmp::Ordering;
use std::collections::HashMap;

use regex::RegexBuilder;

use super::error::{EngineError, ErrorCode};
use super::execution::Flags;
use super::parser::{CompareOp, Expr, Placeholder, Pos};
use super::value::{Ternary, Value, compare};
use super::view::field_index;

/// Values substituted for placeholders during execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaceValues {
    /// Values for `?`, in placeholder order.
    pub ordinal: Vec<Value>,
    /// Values for `:name`.
    pub named: HashMap<String, Value>,
}

impl ReplaceValues {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordinal.is_empty() && self.named.is_empty()
    }
}

/// Current record while evaluating row-scoped expressions.
#[derive(Clone, Copy)]
pub(crate) struct Row<'a> {
    pub(crate) header: &'a [String],
    pub(crate) record: &'a [Value],
}

pub(crate) struct Evaluator<'a> {
    flags: &'a Flags,
    replace: &'a ReplaceValues,
}

fn at(code: ErrorCode, pos: Pos, message: impl Into<String>) -> EngineError {
    EngineError::new(code, pos.line, pos.char, message)
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(flags: &'a Flags, replace: &'a ReplaceValues) -> Self {
        Self { flags, replace }
    }

    /// Evaluate a `WHERE` condition; only TRUE keeps the row.
    pub(crate) fn matches(&self, cond: Option<&Expr>, row: Option<Row<'_>>) -> Result<bool, EngineError> {
        match cond {
            None => Ok(true),
            Some(expr) => Ok(self.eval(expr, row)?.to_ternary() == Ternary::True),
        }
    }

    pub(crate) fn eval(&self, expr: &Expr, row: Option<Row<'_>>) -> Result<Value, EngineError> {
        let value = match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Column { name, pos } => {
                let field = row.and_then(|r| {
                    field_index(r.header, name).and_then(|i| r.record.get(i))
                });
                match field {
                    Some(v) => v.clone(),
                    None => {
                        return Err(at(
                            ErrorCode::FieldNotExist,
                            *pos,
                            format!("field {name} does not exist"),
                        ));
                    }
                }
            }
            Expr::Placeholder { placeholder, pos } => self.placeholder(placeholder, *pos)?,
            Expr::Function { name, args, pos } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, row)?);
                }
                self.function(name, values, *pos)?
            }
            Expr::Compare { op, left, right } => {
                let l = self.eval(left, row)?;
                let r = self.eval(right, row)?;
                let ord = compare(&l, &r, &self.flags.datetime_format, &self.flags.location);
                Value::Ternary(match ord {
                    None => Ternary::Unknown,
                    Some(ord) => Ternary::from_bool(compare_result(*op, ord)),
                })
            }
            Expr::Concat { left, right } => {
                let l = self.eval(left, row)?.to_text();
                let r = self.eval(right, row)?.to_text();
                match (l, r) {
                    (Some(l), Some(r)) => Value::String(l + &r),
                    _ => Value::Null,
                }
            }
            Expr::And(left, right) => {
                let l = self.eval(left, row)?.to_ternary();
                if l == Ternary::False {
                    return Ok(Value::Ternary(Ternary::False));
                }
                Value::Ternary(l.and(self.eval(right, row)?.to_ternary()))
            }
            Expr::Or(left, right) => {
                let l = self.eval(left, row)?.to_ternary();
                if l == Ternary::True {
                    return Ok(Value::Ternary(Ternary::True));
                }
                Value::Ternary(l.or(self.eval(right, row)?.to_ternary()))
            }
            Expr::Not(inner) => Value::Ternary(self.eval(inner, row)?.to_ternary().not()),
            Expr::IsNull { expr, negated } => {
                let is_null = self.eval(expr, row)?.is_null();
                Value::Ternary(Ternary::from_bool(is_null != *negated))
            }
            Expr::Like {
                expr,
                pattern,
                negated,
            } => {
                let subject = self.eval(expr, row)?.to_text();
                let pattern = self.eval(pattern, row)?.to_text();
                match (subject, pattern) {
                    (Some(s), Some(p)) => {
                        let hit = like(&s, &p)?;
                        Value::Ternary(Ternary::from_bool(hit != *negated))
                    }
                    _ => Value::Ternary(Ternary::Unknown),
                }
            }
        };
        Ok(value)
    }

    fn placeholder(&self, placeholder: &Placeholder, pos: Pos) -> Result<Value, EngineError> {
        let value = match placeholder {
            Placeholder::Ordinal(n) => self.replace.ordinal.get(n - 1),
            Placeholder::Named(name) => self.replace.named.get(name),
        };
        value.cloned().ok_or_else(|| {
            at(
                ErrorCode::Placeholder,
                pos,
                format!("no replace value for {placeholder}"),
            )
        })
    }

    fn function(&self, name: &str, args: Vec<Value>, pos: Pos) -> Result<Value, EngineError> {
        let unary = |mut args: Vec<Value>| -> Result<Value, EngineError> {
            if args.len() != 1 {
                return Err(at(
                    ErrorCode::FunctionArgument,
                    pos,
                    format!("function {name} takes exactly 1 argument"),
                ));
            }
            Ok(args.remove(0))
        };
        let text = |v: &Value, f: fn(&str) -> String| match v.to_text() {
            Some(s) => Value::String(f(&s)),
            None => Value::Null,
        };
        let value = match name {
            "INTEGER" => {
                let v = unary(args)?;
                match &v {
                    Value::Datetime(dt) => Value::Integer(dt.timestamp()),
                    _ => v.to_integer().map_or(Value::Null, Value::Integer),
                }
            }
            "FLOAT" => unary(args)?.to_float().map_or(Value::Null, Value::Float),
            "STRING" => unary(args)?.to_text().map_or(Value::Null, Value::String),
            "BOOLEAN" => unary(args)?
                .to_ternary()
                .as_bool()
                .map_or(Value::Null, Value::Boolean),
            "DATETIME" => unary(args)?
                .to_datetime(&self.flags.datetime_format, &self.flags.location)
                .map_or(Value::Null, Value::Datetime),
            "UPPER" => text(&unary(args)?, str::to_uppercase),
            "LOWER" => text(&unary(args)?, str::to_lowercase),
            "TRIM" => text(&unary(args)?, |s| s.trim().to_string()),
            "LEN" => match unary(args)?.to_text() {
                Some(s) => Value::Integer(i64::try_from(s.chars().count()).unwrap_or(i64::MAX)),
                None => Value::Null,
            },
            _ => {
                return Err(at(
                    ErrorCode::FunctionNotExist,
                    pos,
                    format!("function {name} does not exist"),
                ));
            }
        };
        Ok(value)
    }
}

fn compare_result(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::NotEq => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::LtEq => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::GtEq => ord != Ordering::Less,
    }
}

/// Case-insensitive `LIKE`: `%` matches any run, `_` one character, `\` escapes.
fn like(subject: &str, pattern: &str) -> Result<bool, EngineError> {
    let mut re = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            _ => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    let regex = RegexBuilder::new(&re)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EngineError::unpositioned(ErrorCode::InvalidValue, e.to_string()))?;
    Ok(regex.is_match(subject))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::parser::{ParseOptions, SelectField, Statement, parse};

    fn first_field(sql: &str) -> Expr {
        let parsed = parse(sql, ParseOptions::default()).unwrap();
        let Statement::Select(select) = parsed.statements.into_iter().next().unwrap() else {
            panic!("expected select");
        };
        match select.fields.into_iter().next().unwrap() {
            SelectField::Expr { expr, .. } => expr,
            SelectField::All => panic!("expected expression"),
        }
    }

    fn eval(sql: &str, replace: &ReplaceValues) -> Result<Value, EngineError> {
        let flags = Flags::default();
        let header = vec!["col1".to_string(), "col2".to_string()];
        let record = vec![Value::String("2".into()), Value::String("str2".into())];
        let row = Row {
            header: &header,
            record: &record,
        };
        Evaluator::new(&flags, replace).eval(&first_field(sql), Some(row))
    }

    #[test]
    fn functions_convert_field_text() {
        let none = ReplaceValues::default();
        assert_eq!(eval("SELECT INTEGER(col1)", &none).unwrap(), Value::Integer(2));
        assert_eq!(eval("SELECT UPPER(col2)", &none).unwrap(), Value::String("STR2".into()));
        assert_eq!(eval("SELECT LEN(col2)", &none).unwrap(), Value::Integer(4));
        assert_eq!(eval("SELECT INTEGER(col2)", &none).unwrap(), Value::Null);
    }

    #[test]
    fn comparisons_are_three_valued() {
        let none = ReplaceValues::default();
        assert_eq!(
            eval("SELECT col1 = 2 AND col2 LIKE 'STR%'", &none).unwrap(),
            Value::Ternary(Ternary::True)
        );
        assert_eq!(
            eval("SELECT col1 = NULL", &none).unwrap(),
            Value::Ternary(Ternary::Unknown)
        );
        assert_eq!(
            eval("SELECT NULL IS NULL OR col1 = 3", &none).unwrap(),
            Value::Ternary(Ternary::True)
        );
    }

    #[test]
    fn placeholders_take_replace_values() {
        let mut replace = ReplaceValues::default();
        replace.ordinal.push(Value::Integer(2));
        replace.named.insert("name".into(), Value::String("x".into()));
        assert_eq!(
            eval("SELECT col1 = ?", &replace).unwrap(),
            Value::Ternary(Ternary::True)
        );
        assert_eq!(
            eval("SELECT :name || col2", &replace).unwrap(),
            Value::String("xstr2".into())
        );
        let err = eval("SELECT :missing", &replace).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Placeholder);
    }

    #[test]
    fn unknown_fields_and_functions_are_positioned() {
        let none = ReplaceValues::default();
        let err = eval("SELECT col9", &none).unwrap_err();
        assert_eq!(err.to_string(), "[L:1 C:8] field col9 does not exist");
        let err = eval("SELECT NOPE(col1)", &none).unwrap_err();
        assert_eq!(err.code(), ErrorCode::FunctionNotExist);
    }

    #[test]
    fn like_escapes_regex_metacharacters() {
        assert!(like("a.b", "a.b").unwrap());
        assert!(!like("axb", "a.b").unwrap());
        assert!(like("100%", "100\\%").unwrap());
        assert!(like("abc", "_B%").unwrap());
    }
}
