//! Value types exchanged with the driver.
//!
//! Handles, execute and fetch mode flags, bind type tags, statement types and
//! the raw rows returned by [`Driver::fetch_row`](super::Driver::fetch_row).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Opaque driver-owned handle of a parsed statement or cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatementHandle(pub u64);

impl StatementHandle {
    /// Create a new statement handle.
    pub fn new(handle: u64) -> Self {
        Self(handle)
    }

    /// Get the raw handle value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for StatementHandle {
    fn from(handle: u64) -> Self {
        Self(handle)
    }
}

impl fmt::Display for StatementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// Execute mode tags understood by the driver.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExecuteMode: u32 {
        /// Parse and describe the select list without fetching
        const DESCRIBE_ONLY = 0x10;
        /// Commit the transaction when execution succeeds
        const COMMIT_ON_SUCCESS = 0x20;
    }
}

impl ExecuteMode {
    /// Execute inside the current transaction.
    pub const NO_AUTO_COMMIT: ExecuteMode = ExecuteMode::empty();

    /// Whether the mode is one of the tags drivers recognize.
    pub fn is_known(&self) -> bool {
        *self == Self::NO_AUTO_COMMIT
            || *self == Self::DESCRIBE_ONLY
            || *self == Self::COMMIT_ON_SUCCESS
    }

    /// Whether execution only describes the statement.
    pub fn is_describe_only(&self) -> bool {
        self.contains(Self::DESCRIBE_ONLY)
    }
}

bitflags! {
    /// Row fetch mode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FetchMode: u32 {
        /// Positionally indexed rows
        const NUM = 0x01;
        /// Name indexed rows
        const ASSOC = 0x02;
        /// Both positional and name indexed
        const BOTH = Self::NUM.bits() | Self::ASSOC.bits();
        /// Return NULL columns instead of skipping them
        const RETURN_NULLS = 0x04;
        /// Return LOB contents instead of locators
        const RETURN_LOBS = 0x08;
    }
}

impl Default for FetchMode {
    fn default() -> Self {
        FetchMode::RETURN_NULLS | FetchMode::RETURN_LOBS
    }
}

/// Type tag of a bound host variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindType {
    /// Let the driver pick (character data)
    #[default]
    Default,
    /// Character string
    Char,
    /// Integer
    Integer,
    /// Floating point number
    Float,
    /// Boolean (PL/SQL)
    Boolean,
    /// Raw binary
    Binary,
    /// Character LOB
    Clob,
    /// Binary LOB
    Blob,
    /// Ref cursor (nested statement)
    Cursor,
}

impl FromStr for BindType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(BindType::Default),
            "char" | "chr" | "varchar" => Ok(BindType::Char),
            "integer" | "int" => Ok(BindType::Integer),
            "float" | "flt" => Ok(BindType::Float),
            "boolean" | "bool" | "bol" => Ok(BindType::Boolean),
            "binary" | "bin" | "raw" => Ok(BindType::Binary),
            "clob" => Ok(BindType::Clob),
            "blob" => Ok(BindType::Blob),
            "cursor" | "rset" => Ok(BindType::Cursor),
            other => Err(format!("unknown bind type '{}'", other)),
        }
    }
}

impl fmt::Display for BindType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindType::Default => "DEFAULT",
            BindType::Char => "CHAR",
            BindType::Integer => "INTEGER",
            BindType::Float => "FLOAT",
            BindType::Boolean => "BOOLEAN",
            BindType::Binary => "BINARY",
            BindType::Clob => "CLOB",
            BindType::Blob => "BLOB",
            BindType::Cursor => "CURSOR",
        };
        f.write_str(name)
    }
}

/// A resolved host-variable value as handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Character data
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Structured value bound with an explicit type
    Json(Value),
    /// Handle of a prepared cursor statement
    Cursor(StatementHandle),
    /// Collection for array binds
    Array(Vec<BindValue>),
}

impl BindValue {
    /// Whether the value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    /// Short human-readable rendering, used in logs and profiling.
    pub fn render(&self) -> String {
        match self {
            BindValue::Null => "NULL".to_string(),
            BindValue::Bool(b) => b.to_string(),
            BindValue::Int(i) => i.to_string(),
            BindValue::Float(f) => f.to_string(),
            BindValue::Text(s) => format!("'{}'", s),
            BindValue::Bytes(b) => format!("0x{}", hex::encode(b)),
            BindValue::Json(v) => v.to_string(),
            BindValue::Cursor(h) => format!("CURSOR {}", h),
            BindValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(BindValue::render).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

/// Type of SQL statement as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementType {
    /// SELECT query
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// MERGE statement
    Merge,
    /// DDL statement (CREATE, ALTER, DROP)
    Ddl,
    /// Anonymous PL/SQL block (BEGIN, DECLARE)
    PlSql,
    /// Procedure call
    Call,
    /// Unknown or other statement type
    #[default]
    Unknown,
}

impl StatementType {
    /// Detect statement type from SQL text.
    ///
    /// Drivers that cannot ask the server may use this as their
    /// `statement_type` implementation.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = sql.trim_start().to_uppercase();

        if trimmed.starts_with("SELECT") || trimmed.starts_with("WITH") {
            Self::Select
        } else if trimmed.starts_with("INSERT") {
            Self::Insert
        } else if trimmed.starts_with("UPDATE") {
            Self::Update
        } else if trimmed.starts_with("DELETE") {
            Self::Delete
        } else if trimmed.starts_with("MERGE") {
            Self::Merge
        } else if trimmed.starts_with("CREATE")
            || trimmed.starts_with("ALTER")
            || trimmed.starts_with("DROP")
            || trimmed.starts_with("TRUNCATE")
        {
            Self::Ddl
        } else if trimmed.starts_with("BEGIN") || trimmed.starts_with("DECLARE") {
            Self::PlSql
        } else if trimmed.starts_with("CALL") {
            Self::Call
        } else {
            Self::Unknown
        }
    }

    /// Check if this statement type returns a result set.
    pub fn returns_result_set(&self) -> bool {
        matches!(self, Self::Select)
    }
}

/// Metadata of one select-list column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    /// 1-based column position
    pub index: usize,
    /// Column name
    pub name: String,
    /// Type name, e.g. `VARCHAR2`
    pub type_name: String,
    /// Driver type code
    pub type_raw: i64,
    /// Size in bytes
    pub size: i64,
    /// Numeric precision
    pub precision: i64,
    /// Numeric scale
    pub scale: i64,
}

/// One row as fetched by the driver.
///
/// Column names are shared between all rows of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from column names and values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column values in select-list order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a 0-based position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Position of a column by name.
    ///
    /// Exact matches win over ASCII case-insensitive ones.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }

    /// Row as a positional JSON array.
    pub fn into_array(self) -> Value {
        Value::Array(self.values)
    }

    /// Row as a record keyed by column name, in select-list order.
    pub fn into_record(self) -> Map<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values)
            .collect::<Map<String, Value>>()
    }
}
