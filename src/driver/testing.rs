//! Shared `mockall` driver for unit tests.

use super::messages::{BindType, BindValue, ExecuteMode, FetchMode, Row, StatementHandle, StatementType};
use super::protocol::{Driver, SharedDriver};
use crate::error::DriverError;
use async_trait::async_trait;
use mockall::mock;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

mock! {
    pub Connection {}

    #[async_trait]
    impl Driver for Connection {
        async fn parse(&mut self, sql: &str) -> Result<StatementHandle, DriverError>;
        async fn new_cursor(&mut self) -> Result<StatementHandle, DriverError>;
        async fn bind_by_name(&mut self, handle: StatementHandle, name: &str, value: &BindValue, length: Option<i64>, bind_type: BindType) -> Result<(), DriverError>;
        async fn bind_array_by_name(&mut self, handle: StatementHandle, name: &str, values: &[BindValue], max_table_length: usize, max_item_length: Option<i64>, bind_type: BindType) -> Result<(), DriverError>;
        async fn execute(&mut self, handle: StatementHandle, mode: ExecuteMode) -> Result<(), DriverError>;
        async fn fetch_row(&mut self, handle: StatementHandle, mode: FetchMode) -> Result<Option<Row>, DriverError>;
        async fn fetch_all_rows(&mut self, handle: StatementHandle, skip: usize, max_rows: Option<usize>, mode: FetchMode) -> Result<Vec<Row>, DriverError>;
        async fn field_count(&mut self, handle: StatementHandle) -> Result<usize, DriverError>;
        async fn field_name(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError>;
        async fn field_size(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;
        async fn field_precision(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;
        async fn field_scale(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;
        async fn field_type(&mut self, handle: StatementHandle, index: usize) -> Result<String, DriverError>;
        async fn field_type_raw(&mut self, handle: StatementHandle, index: usize) -> Result<i64, DriverError>;
        async fn affected_rows(&mut self, handle: StatementHandle) -> Result<i64, DriverError>;
        async fn statement_type(&mut self, handle: StatementHandle) -> Result<StatementType, DriverError>;
        async fn free(&mut self, handle: StatementHandle) -> Result<(), DriverError>;
        async fn commit(&mut self) -> Result<(), DriverError>;
        async fn rollback(&mut self) -> Result<(), DriverError>;
        fn is_execute_mode(&self, mode: ExecuteMode) -> bool;
    }
}

/// Mock with the execute-mode check wired to the standard tags.
pub(crate) fn mock_connection() -> MockConnection {
    let mut mock = MockConnection::new();
    mock.expect_is_execute_mode().returning(|mode| mode.is_known());
    mock
}

/// Wrap a mock as a shared driver.
pub(crate) fn shared(mock: MockConnection) -> SharedDriver {
    Arc::new(Mutex::new(mock))
}

/// Build rows sharing one column list.
pub(crate) fn rows(columns: &[&str], data: Vec<Vec<Value>>) -> Vec<Row> {
    let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
    data.into_iter()
        .map(|values| Row::new(Arc::clone(&columns), values))
        .collect()
}

/// Make `fetch_row` yield the given rows, then end of data forever.
pub(crate) fn expect_rows(mock: &mut MockConnection, rows: Vec<Row>) {
    let mut iter = rows.into_iter();
    mock.expect_fetch_row().returning(move |_, _| Ok(iter.next()));
}
