//! Row shaping.
//!
//! A [`FetchShape`] turns one driver row plus its 0-based position into a
//! `(key, value)` pair. Eager fetches accumulate the pairs into [`Rows`], lazy
//! fetches yield them one by one.

use crate::driver::{FetchMode, Row};
use crate::error::StatementError;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Eagerly materialized result, in first-fetch order.
///
/// Shapes that produce duplicate keys (pairs, map) keep the last value.
pub type Rows = IndexMap<RowKey, Value>;

/// Key of a shaped row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    /// 0-based position of the row in the result
    Index(usize),
    /// Integer field value
    Int(i64),
    /// Text field value
    Text(String),
    /// NULL field value
    Null,
}

impl From<&Value> for RowKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => RowKey::Null,
            Value::Bool(b) => RowKey::Int(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RowKey::Int(i),
                None => RowKey::Text(n.to_string()),
            },
            Value::String(s) => RowKey::Text(s.clone()),
            nested => RowKey::Text(nested.to_string()),
        }
    }
}

impl From<usize> for RowKey {
    fn from(index: usize) -> Self {
        RowKey::Index(index)
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        RowKey::Int(value)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        RowKey::Text(value.to_string())
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        RowKey::Text(value)
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Index(i) => write!(f, "{}", i),
            RowKey::Int(i) => write!(f, "{}", i),
            RowKey::Text(s) => f.write_str(s),
            RowKey::Null => f.write_str("NULL"),
        }
    }
}

/// Reference to a select-list column: 1-based position or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// 1-based position
    Index(i64),
    /// Column name, matched exactly first, then ignoring ASCII case
    Name(String),
}

impl Default for Column {
    fn default() -> Self {
        Column::Index(1)
    }
}

impl Column {
    /// Reject positions below 1.
    pub fn validate(&self) -> Result<(), StatementError> {
        match self {
            Column::Index(index) if *index < 1 => {
                Err(StatementError::InvalidColumnIndex { index: *index })
            }
            _ => Ok(()),
        }
    }

    /// 0-based position of the column in `row`.
    pub fn position(&self, row: &Row) -> Result<usize, StatementError> {
        self.validate()?;
        match self {
            Column::Index(index) => {
                let position = (*index - 1) as usize;
                if position < row.len() {
                    Ok(position)
                } else {
                    Err(StatementError::UnknownColumn(format!(
                        "position {} of {}",
                        index,
                        row.len()
                    )))
                }
            }
            Column::Name(name) => row
                .position(name)
                .ok_or_else(|| StatementError::UnknownColumn(name.clone())),
        }
    }

    /// Value of the column in `row`.
    pub fn extract(&self, row: &Row) -> Result<Value, StatementError> {
        let position = self.position(row)?;
        Ok(row.get(position).cloned().unwrap_or(Value::Null))
    }
}

impl From<usize> for Column {
    fn from(index: usize) -> Self {
        Column::Index(index as i64)
    }
}

impl From<i32> for Column {
    fn from(index: i32) -> Self {
        Column::Index(i64::from(index))
    }
}

impl From<i64> for Column {
    fn from(index: i64) -> Self {
        Column::Index(index)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::Name(name.to_string())
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column::Name(name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Index(i) => write!(f, "#{}", i),
            Column::Name(name) => f.write_str(name),
        }
    }
}

/// Output of a row callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Mapped {
    /// Plain value, keyed by the row index
    Value(Value),
    /// Explicit key and value
    Pair(RowKey, Value),
}

impl From<Value> for Mapped {
    fn from(value: Value) -> Self {
        Mapped::Value(value)
    }
}

impl<K: Into<RowKey>> From<(K, Value)> for Mapped {
    fn from((key, value): (K, Value)) -> Self {
        Mapped::Pair(key.into(), value)
    }
}

/// Caller supplied row mapper.
#[derive(Clone)]
pub struct RowCallback(Arc<dyn Fn(&Row, usize) -> Mapped + Send + Sync>);

impl RowCallback {
    pub fn new<F, M>(f: F) -> Self
    where
        F: Fn(&Row, usize) -> M + Send + Sync + 'static,
        M: Into<Mapped>,
    {
        Self(Arc::new(move |row, index| f(row, index).into()))
    }

    pub fn call(&self, row: &Row, index: usize) -> Mapped {
        (self.0)(row, index)
    }
}

impl fmt::Debug for RowCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowCallback")
    }
}

/// Row transformation strategy.
#[derive(Debug, Clone, Default)]
pub enum FetchShape {
    /// Positional JSON array
    #[default]
    Array,
    /// JSON object keyed by column name
    Assoc,
    /// Record, for typed retrieval
    Object,
    /// One field of each row
    Column(Column),
    /// `key column => value column`, last duplicate wins
    Pairs { key: Column, value: Column },
    /// `index column => whole record`, last duplicate wins
    Map(Column),
    /// Caller supplied mapper
    Callback(RowCallback),
}

impl FetchShape {
    /// Key/value pairs from the first two columns.
    pub fn pairs() -> Self {
        FetchShape::Pairs {
            key: Column::Index(1),
            value: Column::Index(2),
        }
    }

    /// Check column references before any driver call.
    pub fn validate(&self) -> Result<(), StatementError> {
        match self {
            FetchShape::Column(column) | FetchShape::Map(column) => column.validate(),
            FetchShape::Pairs { key, value } => {
                key.validate()?;
                value.validate()
            }
            _ => Ok(()),
        }
    }

    /// Fetch mode the shape needs from the driver, before configured flags.
    pub fn base_mode(&self) -> FetchMode {
        match self {
            FetchShape::Array => FetchMode::NUM,
            FetchShape::Assoc | FetchShape::Object | FetchShape::Map(_) => FetchMode::ASSOC,
            FetchShape::Column(_) | FetchShape::Pairs { .. } | FetchShape::Callback(_) => {
                FetchMode::BOTH
            }
        }
    }

    /// Shape one row.
    pub fn apply(&self, row: Row, index: usize) -> Result<(RowKey, Value), StatementError> {
        match self {
            FetchShape::Array => Ok((RowKey::Index(index), row.into_array())),
            FetchShape::Assoc | FetchShape::Object => {
                Ok((RowKey::Index(index), Value::Object(row.into_record())))
            }
            FetchShape::Column(column) => Ok((RowKey::Index(index), column.extract(&row)?)),
            FetchShape::Pairs { key, value } => {
                let k = key.extract(&row)?;
                let v = value.extract(&row)?;
                Ok((RowKey::from(&k), v))
            }
            FetchShape::Map(column) => {
                let k = column.extract(&row)?;
                Ok((RowKey::from(&k), Value::Object(row.into_record())))
            }
            FetchShape::Callback(callback) => match callback.call(&row, index) {
                Mapped::Value(v) => Ok((RowKey::Index(index), v)),
                Mapped::Pair(k, v) => Ok((k, v)),
            },
        }
    }
}
