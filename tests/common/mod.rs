//! Common test utilities for ocistmt-rs integration tests.
//!
//! # Scripted driver
//!
//! [`FakeDriver`] is an in-memory [`Driver`] that answers queries from
//! result sets registered per SQL text. `SELECT COUNT(*) FROM (<sql>)` is
//! answered from the row count of `<sql>`. Every call that matters to the
//! statement layer is recorded in a shared [`Journal`], so tests can check
//! which handles were parsed, bound, executed and freed.
//!
//! ```ignore
//! let (driver, journal) = FakeDriver::new()
//!     .with_table("SELECT ID FROM T", &["ID"], vec![vec![json!(1)]])
//!     .connect();
//! ```
//!
//! # Logging
//!
//! Call [`init_tracing`] at the start of a test and run with
//! `RUST_LOG=ocistmt_rs=debug` to see the statement layer's logs.

#![allow(dead_code)]

use async_trait::async_trait;
use ocistmt_rs::{
    BindType, BindValue, Driver, DriverError, ExecuteMode, FetchMode, Row, SharedDriver,
    StatementHandle, StatementType,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use tokio::sync::Mutex;

const COUNT_PREFIX: &str = "SELECT COUNT(*) FROM (";

/// Install a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a row list sharing one column list.
pub fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> (Arc<[String]>, Vec<Vec<Value>>) {
    (columns.iter().map(|c| c.to_string()).collect(), data)
}

/// Calls seen by a [`FakeDriver`].
#[derive(Debug, Default)]
pub struct Journal {
    /// SQL texts parsed, in order
    pub parsed: Vec<String>,
    /// Number of cursor handles allocated
    pub cursors: usize,
    /// Scalar and array binds as `(handle, name, value, type)`
    pub binds: Vec<(StatementHandle, String, BindValue, BindType)>,
    /// Executions as `(sql, mode)`
    pub executed: Vec<(String, ExecuteMode)>,
    /// Handles released, in order
    pub freed: Vec<StatementHandle>,
    /// Handles currently allocated
    pub open: HashSet<StatementHandle>,
    pub commits: usize,
    pub rollbacks: usize,
}

impl Journal {
    /// Number of executions of a SQL text, describe-only runs included.
    pub fn executions_of(&self, sql: &str) -> usize {
        self.executed.iter().filter(|(s, _)| s == sql).count()
    }

    /// How many times a handle was released.
    pub fn times_freed(&self, handle: StatementHandle) -> usize {
        self.freed.iter().filter(|h| **h == handle).count()
    }
}

/// Shared view of a driver's journal.
#[derive(Debug, Clone)]
pub struct JournalHandle(Arc<StdMutex<Journal>>);

impl JournalHandle {
    pub fn get(&self) -> MutexGuard<'_, Journal> {
        self.0.lock().unwrap()
    }
}

#[derive(Debug, Clone)]
struct Table {
    columns: Arc<[String]>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug)]
struct OpenHandle {
    sql: String,
    /// Loaded by a describe or an execution
    table: Option<Table>,
    executed: bool,
    position: usize,
    fetched: i64,
}

/// Scripted in-memory driver.
#[derive(Debug, Default)]
pub struct FakeDriver {
    tables: HashMap<String, Table>,
    affected: HashMap<String, i64>,
    failing: HashSet<String>,
    handles: HashMap<StatementHandle, OpenHandle>,
    next_handle: u64,
    journal: Arc<StdMutex<Journal>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the result set of a query.
    pub fn with_table(mut self, sql: &str, columns: &[&str], data: Vec<Vec<Value>>) -> Self {
        let (columns, rows) = rows(columns, data);
        self.tables.insert(sql.to_string(), Table { columns, rows });
        self
    }

    /// Register the affected row count of a DML statement.
    pub fn with_affected(mut self, sql: &str, affected: i64) -> Self {
        self.affected.insert(sql.to_string(), affected);
        self
    }

    /// Make executions of a SQL text fail.
    pub fn with_failing_execute(mut self, sql: &str) -> Self {
        self.failing.insert(sql.to_string());
        self
    }

    /// Share the driver and keep a view of its journal.
    pub fn connect(self) -> (SharedDriver, JournalHandle) {
        let journal = JournalHandle(Arc::clone(&self.journal));
        (Arc::new(Mutex::new(self)), journal)
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap()
    }

    fn allocate(&mut self, sql: &str) -> StatementHandle {
        self.next_handle += 1;
        let handle = StatementHandle(self.next_handle);
        self.handles.insert(
            handle,
            OpenHandle {
                sql: sql.to_string(),
                table: None,
                executed: false,
                position: 0,
                fetched: 0,
            },
        );
        self.journal().open.insert(handle);
        handle
    }

    fn table_for(&self, sql: &str) -> Table {
        if let Some(table) = self.tables.get(sql) {
            return table.clone();
        }
        if let Some(inner) = sql.strip_prefix(COUNT_PREFIX).and_then(|s| s.strip_suffix(')')) {
            let count = self.tables.get(inner).map_or(0, |t| t.rows.len());
            let (columns, rows) = rows(&["COUNT(*)"], vec![vec![json!(count)]]);
            return Table { columns, rows };
        }
        Table {
            columns: Arc::from(Vec::<String>::new()),
            rows: Vec::new(),
        }
    }

    fn open_handle(&mut self, handle: StatementHandle) -> Result<&mut OpenHandle, DriverError> {
        self.handles
            .get_mut(&handle)
            .ok_or(DriverError::InvalidHandle(handle.as_u64()))
    }

    fn described(&mut self, handle: StatementHandle, index: usize) -> Result<(Table, usize), DriverError> {
        let open = self.open_handle(handle)?;
        let table = open.table.clone().ok_or_else(|| DriverError::Metadata {
            index,
            message: "statement not described".to_string(),
        })?;
        if index == 0 || index > table.columns.len() {
            return Err(DriverError::Metadata {
                index,
                message: "column index out of range".to_string(),
            });
        }
        Ok((table, index - 1))
    }

    fn is_numeric(table: &Table, position: usize) -> bool {
        table
            .rows
            .first()
            .and_then(|row| row.get(position))
            .is_some_and(Value::is_number)
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn parse(&mut self, sql: &str) -> Result<StatementHandle, DriverError> {
        if sql.trim().is_empty() {
            return Err(DriverError::Parse {
                sql: sql.to_string(),
                message: "ORA-24373: invalid length specified for statement".to_string(),
            });
        }
        self.journal().parsed.push(sql.to_string());
        Ok(self.allocate(sql))
    }

    async fn new_cursor(&mut self) -> Result<StatementHandle, DriverError> {
        self.journal().cursors += 1;
        Ok(self.allocate(""))
    }

    async fn bind_by_name(
        &mut self,
        handle: StatementHandle,
        name: &str,
        value: &BindValue,
        _length: Option<i64>,
        bind_type: BindType,
    ) -> Result<(), DriverError> {
        self.open_handle(handle)?;
        if let BindValue::Cursor(cursor) = value {
            if !self.handles.contains_key(cursor) {
                return Err(DriverError::Bind {
                    name: name.to_string(),
                    message: format!("cursor {} is not allocated", cursor),
                });
            }
        }
        self.journal()
            .binds
            .push((handle, name.to_string(), value.clone(), bind_type));
        Ok(())
    }

    async fn bind_array_by_name(
        &mut self,
        handle: StatementHandle,
        name: &str,
        values: &[BindValue],
        max_table_length: usize,
        _max_item_length: Option<i64>,
        bind_type: BindType,
    ) -> Result<(), DriverError> {
        self.open_handle(handle)?;
        if values.len() > max_table_length {
            return Err(DriverError::Bind {
                name: name.to_string(),
                message: "ORA-01485: collection longer than its maximum length".to_string(),
            });
        }
        self.journal().binds.push((
            handle,
            name.to_string(),
            BindValue::Array(values.to_vec()),
            bind_type,
        ));
        Ok(())
    }

    async fn execute(&mut self, handle: StatementHandle, mode: ExecuteMode) -> Result<(), DriverError> {
        let sql = self.open_handle(handle)?.sql.clone();
        if self.failing.contains(&sql) {
            return Err(DriverError::Execute(format!("ORA-00942: table or view does not exist: {}", sql)));
        }

        let table = self.table_for(&sql);
        let open = self.open_handle(handle)?;
        open.table = Some(table);
        open.executed = !mode.is_describe_only();
        open.position = 0;
        open.fetched = 0;
        self.journal().executed.push((sql, mode));
        Ok(())
    }

    async fn fetch_row(
        &mut self,
        handle: StatementHandle,
        _mode: FetchMode,
    ) -> Result<Option<Row>, DriverError> {
        let open = self.open_handle(handle)?;
        if !open.executed {
            return Err(DriverError::Fetch("ORA-24338: statement handle not executed".to_string()));
        }
        let Some(table) = &open.table else {
            return Ok(None);
        };
        let Some(values) = table.rows.get(open.position).cloned() else {
            return Ok(None);
        };
        let row = Row::new(Arc::clone(&table.columns), values);
        open.position += 1;
        open.fetched += 1;
        Ok(Some(row))
    }

    async fn fetch_all_rows(
        &mut self,
        handle: StatementHandle,
        skip: usize,
        max_rows: Option<usize>,
        mode: FetchMode,
    ) -> Result<Vec<Row>, DriverError> {
        for _ in 0..skip {
            if self.fetch_row(handle, mode).await?.is_none() {
                return Ok(Vec::new());
            }
        }
        let mut rows = Vec::new();
        while max_rows.map_or(true, |max| rows.len() < max) {
            match self.fetch_row(handle, mode).await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    async fn field_count(&mut self, handle: StatementHandle) -> Result<usize, DriverError> {
        let open = self.open_handle(handle)?;
        Ok(open.table.as_ref().map_or(0, |t| t.columns.len()))
    }

    async fn field_name(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError> {
        let (table, position) = self.described(handle, index)?;
        Ok(table.columns[position].clone())
    }

    async fn field_size(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError> {
        let (table, position) = self.described(handle, index)?;
        Ok(if Self::is_numeric(&table, position) { 22 } else { 4000 })
    }

    async fn field_precision(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError> {
        let (table, position) = self.described(handle, index)?;
        Ok(if Self::is_numeric(&table, position) { 38 } else { 0 })
    }

    async fn field_scale(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError> {
        self.described(handle, index)?;
        Ok(0)
    }

    async fn field_type(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError> {
        let (table, position) = self.described(handle, index)?;
        Ok(if Self::is_numeric(&table, position) { "NUMBER" } else { "VARCHAR2" }.to_string())
    }

    async fn field_type_raw(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError> {
        let (table, position) = self.described(handle, index)?;
        Ok(if Self::is_numeric(&table, position) { 2 } else { 1 })
    }

    async fn affected_rows(&mut self, handle: StatementHandle) -> Result<i64, DriverError> {
        let open = self.open_handle(handle)?;
        if StatementType::from_sql(&open.sql).returns_result_set() {
            return Ok(open.fetched);
        }
        let executed = open.executed;
        let sql = open.sql.clone();
        Ok(if executed {
            self.affected.get(&sql).copied().unwrap_or(0)
        } else {
            0
        })
    }

    async fn statement_type(&mut self, handle: StatementHandle) -> Result<StatementType, DriverError> {
        let open = self.open_handle(handle)?;
        Ok(StatementType::from_sql(&open.sql))
    }

    async fn free(&mut self, handle: StatementHandle) -> Result<(), DriverError> {
        if self.handles.remove(&handle).is_none() {
            return Err(DriverError::InvalidHandle(handle.as_u64()));
        }
        let mut journal = self.journal();
        journal.open.remove(&handle);
        journal.freed.push(handle);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.journal().commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.journal().rollbacks += 1;
        Ok(())
    }

    fn is_execute_mode(&self, mode: ExecuteMode) -> bool {
        mode.is_known()
    }
}
