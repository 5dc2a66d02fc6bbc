//! Driver abstraction trait.
//!
//! This module defines the `Driver` trait through which the statement layer
//! talks to the database. One driver instance represents one live connection;
//! it is shared between statements as [`SharedDriver`].

use crate::error::DriverError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::messages::{BindType, BindValue, ExecuteMode, FetchMode, Row, StatementHandle, StatementType};

/// A live connection shared by every statement created on it.
pub type SharedDriver = Arc<Mutex<dyn Driver>>;

/// Database driver trait.
///
/// Implementations own the connection and every handle they return. Handles
/// are released only through [`Driver::free`].
#[async_trait]
pub trait Driver: Send + Sync {
    /// Parse SQL text into a new statement handle.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Parse` if the text is rejected.
    async fn parse(&mut self, sql: &str) -> Result<StatementHandle, DriverError>;

    /// Allocate a new cursor handle, to be bound as a ref cursor.
    async fn new_cursor(&mut self) -> Result<StatementHandle, DriverError>;

    /// Bind a scalar host variable by placeholder name.
    ///
    /// # Arguments
    ///
    /// * `handle` - Statement handle
    /// * `name` - Placeholder name, with or without the leading colon
    /// * `value` - Resolved value
    /// * `length` - Maximum length hint, `None` to let the driver decide
    /// * `bind_type` - Type tag
    async fn bind_by_name(
        &mut self,
        handle: StatementHandle,
        name: &str,
        value: &BindValue,
        length: Option<i64>,
        bind_type: BindType,
    ) -> Result<(), DriverError>;

    /// Bind a collection host variable by placeholder name.
    ///
    /// # Arguments
    ///
    /// * `handle` - Statement handle
    /// * `name` - Placeholder name
    /// * `values` - Collection items
    /// * `max_table_length` - Maximum number of items
    /// * `max_item_length` - Maximum length of one item, `None` for the driver default
    /// * `bind_type` - Item type tag
    async fn bind_array_by_name(
        &mut self,
        handle: StatementHandle,
        name: &str,
        values: &[BindValue],
        max_table_length: usize,
        max_item_length: Option<i64>,
        bind_type: BindType,
    ) -> Result<(), DriverError>;

    /// Execute a statement.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::Execute` if execution fails.
    async fn execute(&mut self, handle: StatementHandle, mode: ExecuteMode) -> Result<(), DriverError>;

    /// Fetch the next row, `None` once the result set is exhausted.
    async fn fetch_row(
        &mut self,
        handle: StatementHandle,
        mode: FetchMode,
    ) -> Result<Option<Row>, DriverError>;

    /// Fetch the remaining rows in one call.
    ///
    /// # Arguments
    ///
    /// * `skip` - Number of leading rows to discard
    /// * `max_rows` - Upper bound of rows returned, `None` for all
    /// * `mode` - Fetch mode flags
    async fn fetch_all_rows(
        &mut self,
        handle: StatementHandle,
        skip: usize,
        max_rows: Option<usize>,
        mode: FetchMode,
    ) -> Result<Vec<Row>, DriverError>;

    /// Number of columns in the select list.
    async fn field_count(&mut self, handle: StatementHandle) -> Result<usize, DriverError>;

    /// Name of a column (1-based index).
    async fn field_name(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError>;

    /// Size of a column in bytes (1-based index).
    async fn field_size(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;

    /// Numeric precision of a column (1-based index).
    async fn field_precision(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;

    /// Numeric scale of a column (1-based index).
    async fn field_scale(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;

    /// Type name of a column (1-based index).
    async fn field_type(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError>;

    /// Raw driver type code of a column (1-based index).
    async fn field_type_raw(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;

    /// Rows affected by the last execution, or fetched so far for queries.
    async fn affected_rows(&mut self, handle: StatementHandle) -> Result<i64, DriverError>;

    /// Statement type of a parsed handle.
    async fn statement_type(&mut self, handle: StatementHandle) -> Result<StatementType, DriverError>;

    /// Release a handle.
    async fn free(&mut self, handle: StatementHandle) -> Result<(), DriverError>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Check whether an execute mode is recognized by this driver.
    fn is_execute_mode(&self, mode: ExecuteMode) -> bool;
}
