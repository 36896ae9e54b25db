//! Conversion between host scalars and engine values.
//!
//! Arguments arrive as `&dyn SqlArg` so callers can pass plain Rust values
//! (`1_i32`, `"abc"`, `chrono::Utc::now()`, `None::<i64>`) alongside [`RowValues`].

use std::any::Any;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};

use crate::engine::Value;
use crate::error::CsvMiddlewareError;
use crate::types::RowValues;

/// A value that can be passed as a statement argument.
///
/// Implemented for every `'static` type; [`convert_value`] decides which ones are accepted.
pub trait SqlArg: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> SqlArg for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A statement argument, optionally named for `:name` placeholders.
pub struct Arg {
    pub name: Option<String>,
    pub value: Box<dyn SqlArg>,
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arg")
            .field("name", &self.name)
            .field("type", &self.value.as_ref().type_name())
            .finish()
    }
}

/// Positional argument.
///
/// Text must be owned or `'static`; borrow-only text such as `name.as_str()` goes through
/// [`Arg::from`], which copies it.
pub fn arg(value: impl SqlArg) -> Arg {
    Arg {
        name: None,
        value: Box::new(value),
    }
}

/// Named argument; the name is given without the leading `:`.
pub fn named(name: impl Into<String>, value: impl SqlArg) -> Arg {
    Arg {
        name: Some(name.into()),
        value: Box::new(value),
    }
}

impl From<RowValues> for Arg {
    fn from(value: RowValues) -> Self {
        arg(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        arg(value.to_owned())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        arg(value)
    }
}

const HIGH_BIT_MESSAGE: &str = "uint64 values with high bit set are not supported";

fn unsigned(v: u64) -> Result<Value, CsvMiddlewareError> {
    i64::try_from(v)
        .map(Value::Integer)
        .map_err(|_| CsvMiddlewareError::Conversion(HIGH_BIT_MESSAGE.to_string()))
}

/// Convert a host value into an engine value.
///
/// # Errors
///
/// Returns [`CsvMiddlewareError::Conversion`] for types with no engine counterpart and for
/// unsigned 64-bit values that do not fit a signed integer.
pub fn convert_value(input: &dyn SqlArg) -> Result<Value, CsvMiddlewareError> {
    let any = input.as_any();
    if let Some(v) = convert_scalar(any)? {
        return Ok(v);
    }
    if let Some(v) = convert_option(any)? {
        return Ok(v);
    }
    Err(CsvMiddlewareError::Conversion(format!(
        "unsupported type: {}",
        input.type_name()
    )))
}

macro_rules! try_scalar {
    ($any:expr, $($ty:ty => $conv:expr),+ $(,)?) => {
        $(
            if let Some(v) = $any.downcast_ref::<$ty>() {
                return ($conv)(v).map(Some);
            }
        )+
    };
}

#[allow(clippy::redundant_closure_call, clippy::cast_possible_wrap)]
fn convert_scalar(any: &dyn Any) -> Result<Option<Value>, CsvMiddlewareError> {
    try_scalar!(any,
        Value => |v: &Value| Ok(v.clone()),
        RowValues => |v: &RowValues| Ok(from_row_value(v)),
        () => |_: &()| Ok(Value::Null),
        String => |v: &String| Ok(Value::String(v.clone())),
        &'static str => |v: &&str| Ok(Value::String((*v).to_string())),
        i8 => |v: &i8| Ok(Value::Integer(i64::from(*v))),
        i16 => |v: &i16| Ok(Value::Integer(i64::from(*v))),
        i32 => |v: &i32| Ok(Value::Integer(i64::from(*v))),
        i64 => |v: &i64| Ok(Value::Integer(*v)),
        isize => |v: &isize| Ok(Value::Integer(*v as i64)),
        u8 => |v: &u8| Ok(Value::Integer(i64::from(*v))),
        u16 => |v: &u16| Ok(Value::Integer(i64::from(*v))),
        u32 => |v: &u32| Ok(Value::Integer(i64::from(*v))),
        u64 => |v: &u64| unsigned(*v),
        usize => |v: &usize| unsigned(*v as u64),
        f32 => |v: &f32| Ok(Value::Float(f64::from(*v))),
        f64 => |v: &f64| Ok(Value::Float(*v)),
        bool => |v: &bool| Ok(Value::Boolean(*v)),
        DateTime<FixedOffset> => |v: &DateTime<FixedOffset>| Ok(Value::Datetime(*v)),
        DateTime<Utc> => |v: &DateTime<Utc>| Ok(Value::Datetime(v.fixed_offset())),
        DateTime<Local> => |v: &DateTime<Local>| Ok(Value::Datetime(v.fixed_offset())),
        NaiveDateTime => |v: &NaiveDateTime| Ok(Value::Datetime(v.and_utc().fixed_offset())),
    );
    Ok(None)
}

macro_rules! try_option {
    ($any:expr, $($ty:ty),+ $(,)?) => {
        $(
            if let Some(opt) = $any.downcast_ref::<Option<$ty>>() {
                return match opt {
                    None => Ok(Some(Value::Null)),
                    Some(inner) => convert_scalar(inner),
                };
            }
        )+
    };
}

fn convert_option(any: &dyn Any) -> Result<Option<Value>, CsvMiddlewareError> {
    try_option!(any,
        String, &'static str, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool,
        DateTime<FixedOffset>, DateTime<Utc>, DateTime<Local>, NaiveDateTime,
    );
    Ok(None)
}

fn from_row_value(v: &RowValues) -> Value {
    match v {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Float(*f),
        RowValues::Text(s) => Value::String(s.clone()),
        RowValues::Bool(b) => Value::Boolean(*b),
        RowValues::Timestamp(dt) => Value::Datetime(*dt),
        RowValues::Null => Value::Null,
    }
}

/// Project an engine value onto the host scalar set.
#[must_use]
pub fn to_row_value(v: &Value) -> RowValues {
    match v {
        Value::String(s) => RowValues::Text(s.clone()),
        Value::Integer(i) => RowValues::Int(*i),
        Value::Float(f) => RowValues::Float(*f),
        Value::Boolean(b) => RowValues::Bool(*b),
        Value::Ternary(t) => match t.as_bool() {
            Some(b) => RowValues::Bool(b),
            None => RowValues::Null,
        },
        Value::Datetime(dt) => RowValues::Timestamp(*dt),
        Value::Null => RowValues::Null,
    }
}

/// Convert every argument, stopping at the first failure.
pub(crate) fn convert_args(args: &[Arg]) -> Result<Vec<(Option<&str>, Value)>, CsvMiddlewareError> {
    args.iter()
        .map(|a| Ok((a.name.as_deref(), convert_value(a.value.as_ref())?)))
        .collect()
}
