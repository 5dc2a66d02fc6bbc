//! Stateful statement handles.
//!
//! A [`Statement`] owns at most one driver handle together with its bindings
//! and lifecycle state. Operations that need a handle acquire one lazily:
//! binding prepares, fetching executes, reading metadata executes in
//! describe-only mode.

use crate::connection::{FetchStrategy, Session, StatementConfig};
use crate::driver::{
    ExecuteMode, FetchMode, FieldDescription, Row, SharedDriver, StatementHandle, StatementType,
};
use crate::error::StatementError;
use crate::profiler::{NoopProfiler, ProfileId, Profiler};
use crate::query::host_var::{BindInput, HostVariable};
use crate::query::results::{FetchResult, RowStream};
use crate::query::shape::{Column, FetchShape, RowCallback, Rows};
use crate::query::state::StatementState;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// A prepared, bindable, executable statement.
///
/// # Example
///
/// ```no_run
/// # use ocistmt_rs::{SharedDriver, Statement};
/// # async fn example(driver: SharedDriver) -> Result<(), Box<dyn std::error::Error>> {
/// let mut statement = Statement::new(driver, "SELECT name FROM users WHERE id = :id");
/// statement.bind([(":id", 42)]).await?;
/// let name = statement.fetch_value(1).await?;
/// # Ok(())
/// # }
/// ```
pub struct Statement {
    /// Connection the statement runs on
    driver: SharedDriver,
    /// SQL text, immutable for the statement's life
    sql: Arc<str>,
    /// Allocated with `new_cursor` instead of `parse`
    is_cursor: bool,
    /// Driver handle, `None` until prepared and after free
    handle: Option<StatementHandle>,
    /// Lifecycle state
    state: StatementState,
    /// Most recent resolved bindings, replayed onto a new handle after `free`
    bindings: HashMap<String, HostVariable>,
    /// Statement type reported by the driver for the current handle
    statement_type: Option<StatementType>,
    /// Span of the last execution
    profile_id: Option<ProfileId>,
    profiler: Arc<dyn Profiler>,
    session: Arc<Session>,
    config: StatementConfig,
}

impl Statement {
    /// Create a statement with default configuration.
    pub fn new(driver: SharedDriver, sql: impl Into<Arc<str>>) -> Self {
        StatementBuilder::new(driver, sql).build()
    }

    /// Create a cursor statement, to be bound into another statement.
    pub fn cursor(driver: SharedDriver) -> Self {
        StatementBuilder::cursor(driver).build()
    }

    /// Start building a statement.
    pub fn builder(driver: SharedDriver, sql: impl Into<Arc<str>>) -> StatementBuilder {
        StatementBuilder::new(driver, sql)
    }

    /// SQL text of the statement.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Driver handle, if one is held.
    pub fn handle(&self) -> Option<StatementHandle> {
        self.handle
    }

    pub fn is_cursor(&self) -> bool {
        self.is_cursor
    }

    /// Bindings of the last successful `bind`.
    pub fn bindings(&self) -> &HashMap<String, HostVariable> {
        &self.bindings
    }

    /// Span of the last execution.
    pub fn profile_id(&self) -> Option<ProfileId> {
        self.profile_id
    }

    pub fn config(&self) -> &StatementConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether releasing the handle cannot break an in-progress fetch.
    pub fn can_be_freed(&self) -> bool {
        self.state.is_safe_to_free()
    }

    pub(crate) fn set_state(&mut self, state: StatementState) {
        self.state = state;
    }

    pub(crate) fn require_handle(&self) -> Result<StatementHandle, StatementError> {
        self.handle.ok_or_else(|| {
            StatementError::lifecycle(format!("statement holds no handle: {}", self.sql))
        })
    }

    /// Acquire a driver handle if none is held.
    pub async fn prepare(&mut self) -> Result<(), StatementError> {
        if self.handle.is_some() {
            return Ok(());
        }

        let handle = {
            let mut driver = self.driver.lock().await;
            if self.is_cursor {
                driver.new_cursor().await?
            } else {
                driver.parse(&self.sql).await?
            }
        };

        debug!(sql = %self.sql, handle = %handle, "statement prepared");
        self.handle = Some(handle);
        self.state = StatementState::prepared();

        if !self.bindings.is_empty() {
            if let Err(e) = self.replay_bindings(handle).await {
                self.bindings.clear();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Bind the recorded variables again on a fresh handle. Nested cursors
    /// are prepared again if they were freed in the meantime.
    async fn replay_bindings(&mut self, handle: StatementHandle) -> Result<(), StatementError> {
        let mut replayed = HashMap::with_capacity(self.bindings.len());
        for (name, variable) in &self.bindings {
            replayed.insert(name.clone(), variable.refresh().await?);
        }

        {
            let mut driver = self.driver.lock().await;
            for (name, variable) in &replayed {
                variable.bind_to(&mut *driver, handle, name).await?;
            }
        }

        debug!(sql = %self.sql, bindings = replayed.len(), "bindings replayed");
        self.bindings = replayed;
        Ok(())
    }

    /// `name=value` renderings of the current bindings, sorted by name.
    fn rendered_bindings(&self) -> Vec<String> {
        let mut rendered: Vec<String> = self
            .bindings
            .iter()
            .map(|(name, variable)| format!("{}={}", name, variable.render()))
            .collect();
        rendered.sort();
        rendered
    }

    /// Replace the bindings.
    ///
    /// An empty input is a no-op. Otherwise the previous bindings are
    /// cleared, the statement is prepared, every value is normalized and
    /// resolved, and only then forwarded to the driver.
    ///
    /// # Errors
    ///
    /// Returns the resolution or driver error; the statement is left with no
    /// recorded bindings.
    pub async fn bind<I, K, V>(&mut self, bindings: I) -> Result<&mut Self, StatementError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<BindInput>,
    {
        let pending: Vec<(String, HostVariable)> = bindings
            .into_iter()
            .map(|(name, value)| (name.into(), HostVariable::normalize(value)))
            .collect();
        if pending.is_empty() {
            return Ok(self);
        }

        self.bindings.clear();
        self.prepare().await?;

        let mut resolved = Vec::with_capacity(pending.len());
        for (name, variable) in pending {
            resolved.push((name, variable.resolve_for_binding().await?));
        }

        let handle = self.require_handle()?;
        {
            let mut driver = self.driver.lock().await;
            for (name, variable) in &resolved {
                variable.bind_to(&mut *driver, handle, name).await?;
            }
        }

        self.bindings.extend(resolved);
        Ok(self)
    }

    /// Execute the statement.
    ///
    /// Without a mode, or with a mode the driver does not recognize, the
    /// configured default is used: commit on success under auto-commit,
    /// no auto-commit otherwise. A freed statement is prepared again with its
    /// last bindings. A failed execution leaves the state unchanged.
    pub async fn execute(&mut self, mode: Option<ExecuteMode>) -> Result<(), StatementError> {
        self.prepare().await?;
        let handle = self.require_handle()?;

        let bindings = self.rendered_bindings();
        let profile_id = self.profiler.start(&self.sql, &bindings);
        self.profile_id = Some(profile_id);

        let (mode, result) = {
            let mut driver = self.driver.lock().await;
            let default = self.default_execute_mode();
            let requested = mode.unwrap_or(default);
            let mode = if driver.is_execute_mode(requested) {
                requested
            } else {
                default
            };
            (mode, driver.execute(handle, mode).await)
        };
        self.profiler.stop(profile_id);
        result?;

        self.state = if mode.is_describe_only() {
            StatementState::described()
        } else {
            StatementState::executed()
        };
        self.session.record_execution(&self.sql, mode).await;
        Ok(())
    }

    fn default_execute_mode(&self) -> ExecuteMode {
        if self.config.auto_commit {
            ExecuteMode::COMMIT_ON_SUCCESS
        } else {
            ExecuteMode::NO_AUTO_COMMIT
        }
    }

    /// Release the driver handle.
    ///
    /// The state becomes `Freed` unconditionally; freeing twice is a no-op.
    /// Recorded bindings are kept and bound again when the statement is next
    /// prepared.
    pub async fn free(&mut self) -> Result<(), StatementError> {
        self.state = StatementState::freed();
        self.statement_type = None;
        self.profile_id = None;

        if let Some(handle) = self.handle.take() {
            debug!(sql = %self.sql, handle = %handle, "statement freed");
            self.driver.lock().await.free(handle).await?;
        }
        Ok(())
    }

    /// Statement type of the prepared handle.
    pub async fn statement_type(&mut self) -> Result<StatementType, StatementError> {
        if let (Some(statement_type), Some(_)) = (self.statement_type, self.handle) {
            return Ok(statement_type);
        }
        self.prepare().await?;
        let handle = self.require_handle()?;
        let statement_type = self.driver.lock().await.statement_type(handle).await?;
        self.statement_type = Some(statement_type);
        Ok(statement_type)
    }

    /// Rows affected by the last execution.
    pub async fn affected_rows(&mut self) -> Result<i64, StatementError> {
        self.prepare().await?;
        let handle = self.require_handle()?;
        Ok(self.driver.lock().await.affected_rows(handle).await?)
    }

    /// Make column metadata available and return the handle.
    async fn describe(&mut self, index: Option<i64>) -> Result<StatementHandle, StatementError> {
        if let Some(index) = index {
            Column::Index(index).validate()?;
        }
        if !self.state.is_described() || self.handle.is_none() {
            self.execute(Some(ExecuteMode::DESCRIBE_ONLY)).await?;
        }
        self.require_handle()
    }

    /// Number of columns in the select list.
    pub async fn field_count(&mut self) -> Result<usize, StatementError> {
        let handle = self.describe(None).await?;
        Ok(self.driver.lock().await.field_count(handle).await?)
    }

    /// Name of a column (1-based index).
    pub async fn field_name(&mut self, index: i64) -> Result<String, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_name(handle, index as usize).await?)
    }

    /// Size of a column (1-based index).
    pub async fn field_size(&mut self, index: i64) -> Result<i64, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_size(handle, index as usize).await?)
    }

    /// Precision of a column (1-based index).
    pub async fn field_precision(&mut self, index: i64) -> Result<i64, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_precision(handle, index as usize).await?)
    }

    /// Scale of a column (1-based index).
    pub async fn field_scale(&mut self, index: i64) -> Result<i64, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_scale(handle, index as usize).await?)
    }

    /// Type name of a column (1-based index).
    pub async fn field_type(&mut self, index: i64) -> Result<String, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_type(handle, index as usize).await?)
    }

    /// Raw driver type code of a column (1-based index).
    pub async fn field_type_raw(&mut self, index: i64) -> Result<i64, StatementError> {
        let handle = self.describe(Some(index)).await?;
        Ok(self.driver.lock().await.field_type_raw(handle, index as usize).await?)
    }

    /// Full metadata of a column (1-based index).
    pub async fn field_description(&mut self, index: i64) -> Result<FieldDescription, StatementError> {
        let handle = self.describe(Some(index)).await?;
        let position = index as usize;
        let mut driver = self.driver.lock().await;
        Ok(FieldDescription {
            index: position,
            name: driver.field_name(handle, position).await?,
            type_name: driver.field_type(handle, position).await?,
            type_raw: driver.field_type_raw(handle, position).await?,
            size: driver.field_size(handle, position).await?,
            precision: driver.field_precision(handle, position).await?,
            scale: driver.field_scale(handle, position).await?,
        })
    }

    /// Metadata of every column.
    pub async fn field_descriptions(&mut self) -> Result<Vec<FieldDescription>, StatementError> {
        let count = self.field_count().await?;
        let mut fields = Vec::with_capacity(count);
        for index in 1..=count {
            fields.push(self.field_description(index as i64).await?);
        }
        Ok(fields)
    }

    /// Number of rows.
    ///
    /// For a query that has not been fetched yet, an independent
    /// `SELECT COUNT(*)` over the statement's SQL is run with the same
    /// bindings; this statement is left untouched. Otherwise the driver's
    /// affected row count is returned.
    pub async fn count(&mut self) -> Result<i64, StatementError> {
        let acquired = self.handle.is_none();
        let statement_type = self.statement_type().await;
        if acquired {
            // Hand back the handle taken only to ask for the type
            self.free().await?;
        }
        let statement_type = statement_type?;
        if !(statement_type.returns_result_set() && self.state.is_not_fetched_yet()) {
            if acquired {
                return Ok(0);
            }
            return self.affected_rows().await;
        }

        let mut counter = StatementBuilder::new(
            Arc::clone(&self.driver),
            format!("SELECT COUNT(*) FROM ({})", self.sql),
        )
        .config(self.config.clone())
        .profiler(Arc::clone(&self.profiler))
        .build();

        let bindings: Vec<(String, HostVariable)> = self
            .bindings
            .iter()
            .map(|(name, variable)| (name.clone(), variable.clone()))
            .collect();

        let value = match counter.bind(bindings).await {
            Ok(_) => counter.fetch_value(1).await,
            Err(e) => Err(e),
        };
        let freed = counter.free().await;
        let value = value?;
        freed?;

        match value {
            None => Ok(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| StatementError::Conversion(format!("row count {} is not an integer", n))),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| StatementError::Conversion(format!("row count '{}' is not an integer", s))),
            Some(other) => Err(StatementError::Conversion(format!(
                "row count {} is not an integer",
                other
            ))),
        }
    }

    fn fetch_mode(&self, shape: &FetchShape, mode: Option<FetchMode>) -> FetchMode {
        mode.unwrap_or_else(|| shape.base_mode() | self.config.fetch_flags)
    }

    /// Validate the shape, execute if needed and enter `Fetching`.
    async fn begin_fetch(&mut self, shape: &FetchShape) -> Result<StatementHandle, StatementError> {
        shape.validate()?;
        if !self.state.is_fetchable() {
            self.execute(None).await?;
        }
        let handle = self.require_handle()?;
        self.state = StatementState::fetching();
        Ok(handle)
    }

    pub(crate) async fn fetch_next_row(&mut self, mode: FetchMode) -> Result<Option<Row>, StatementError> {
        let handle = self.require_handle()?;
        Ok(self.driver.lock().await.fetch_row(handle, mode).await?)
    }

    /// Lazily fetch shaped rows.
    pub async fn stream(
        &mut self,
        shape: FetchShape,
        mode: Option<FetchMode>,
    ) -> Result<RowStream<'_>, StatementError> {
        let mode = self.fetch_mode(&shape, mode);
        self.begin_fetch(&shape).await?;
        Ok(RowStream::new(self, shape, mode))
    }

    /// Fetch every shaped row.
    pub async fn fetch_all(
        &mut self,
        shape: FetchShape,
        mode: Option<FetchMode>,
    ) -> Result<Rows, StatementError> {
        self.stream(shape, mode).await?.collect_rows().await
    }

    /// Fetch shaped rows, eagerly or lazily according to the fetch strategy.
    pub async fn result(
        &mut self,
        shape: FetchShape,
        mode: Option<FetchMode>,
    ) -> Result<FetchResult<'_>, StatementError> {
        match self.config.strategy {
            FetchStrategy::Eager => Ok(FetchResult::Eager(self.fetch_all(shape, mode).await?)),
            FetchStrategy::Lazy => Ok(FetchResult::Lazy(self.stream(shape, mode).await?)),
        }
    }

    /// Rows as positional arrays.
    pub async fn fetch_array(&mut self) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Array, None).await
    }

    /// Rows as objects keyed by column name.
    pub async fn fetch_assoc(&mut self) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Assoc, None).await
    }

    /// Rows as records.
    pub async fn fetch_object(&mut self) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Object, None).await
    }

    /// One column of every row.
    pub async fn fetch_column(&mut self, column: impl Into<Column>) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Column(column.into()), None).await
    }

    /// `key => value` pairs from two columns.
    pub async fn fetch_pairs(
        &mut self,
        key: impl Into<Column>,
        value: impl Into<Column>,
    ) -> Result<FetchResult<'_>, StatementError> {
        let shape = FetchShape::Pairs {
            key: key.into(),
            value: value.into(),
        };
        self.result(shape, None).await
    }

    /// Records keyed by one column.
    pub async fn fetch_map(&mut self, index: impl Into<Column>) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Map(index.into()), None).await
    }

    /// Rows mapped by a callback.
    pub async fn fetch_callback(&mut self, callback: RowCallback) -> Result<FetchResult<'_>, StatementError> {
        self.result(FetchShape::Callback(callback), None).await
    }

    /// Every row deserialized into `T`.
    pub async fn fetch_objects<T: DeserializeOwned>(&mut self) -> Result<Vec<T>, StatementError> {
        let rows = self.fetch_all(FetchShape::Object, None).await?;
        rows.into_values()
            .map(|record| serde_json::from_value(record).map_err(StatementError::from))
            .collect()
    }

    /// One field of the first row, `None` when there are no rows.
    pub async fn fetch_value(&mut self, column: impl Into<Column>) -> Result<Option<Value>, StatementError> {
        let mut stream = self.stream(FetchShape::Column(column.into()), None).await?;
        let first = stream.next().await.transpose()?;
        stream.close();
        Ok(first.map(|(_, value)| value))
    }

    /// First row as a record, empty when there are no rows.
    pub async fn fetch_one(&mut self) -> Result<Map<String, Value>, StatementError> {
        let mut stream = self.stream(FetchShape::Assoc, None).await?;
        let first = stream.next().await.transpose()?;
        stream.close();
        match first {
            Some((_, Value::Object(record))) => Ok(record),
            _ => Ok(Map::new()),
        }
    }

    /// First row deserialized into `T`, `None` when there are no rows.
    pub async fn fetch_one_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>, StatementError> {
        let record = self.fetch_one().await?;
        if record.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(Value::Object(record))?))
    }

    /// Raw rows in one driver call.
    ///
    /// # Arguments
    ///
    /// * `skip` - Number of leading rows to discard
    /// * `max_rows` - Upper bound of rows returned, `None` for all
    pub async fn fetch_rows(&mut self, skip: usize, max_rows: Option<usize>) -> Result<Vec<Row>, StatementError> {
        let shape = FetchShape::Assoc;
        let mode = FetchMode::BOTH | self.config.fetch_flags;
        let handle = self.begin_fetch(&shape).await?;
        let rows = self
            .driver
            .lock()
            .await
            .fetch_all_rows(handle, skip, max_rows, mode)
            .await;
        self.state = StatementState::fetched();
        Ok(rows?)
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let driver = Arc::clone(&self.driver);
                let sql = Arc::clone(&self.sql);
                runtime.spawn(async move {
                    let result = driver.lock().await.free(handle).await;
                    match result {
                        Ok(()) => debug!(sql = %sql, handle = %handle, "dropped statement freed"),
                        Err(e) => {
                            warn!(sql = %sql, handle = %handle, error = %e, "failed to free dropped statement")
                        }
                    }
                });
            }
            Err(_) => {
                warn!(sql = %self.sql, handle = %handle, "statement dropped outside a runtime, handle not freed");
            }
        }
    }
}

/// Builder for creating statements.
pub struct StatementBuilder {
    driver: SharedDriver,
    sql: Arc<str>,
    is_cursor: bool,
    config: Option<StatementConfig>,
    profiler: Option<Arc<dyn Profiler>>,
    session: Option<Arc<Session>>,
}

impl StatementBuilder {
    /// Create a new statement builder.
    pub fn new(driver: SharedDriver, sql: impl Into<Arc<str>>) -> Self {
        Self {
            driver,
            sql: sql.into(),
            is_cursor: false,
            config: None,
            profiler: None,
            session: None,
        }
    }

    /// Builder for a cursor statement.
    pub fn cursor(driver: SharedDriver) -> Self {
        Self {
            is_cursor: true,
            ..Self::new(driver, "")
        }
    }

    pub fn config(mut self, config: StatementConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Share an existing session instead of opening a new one.
    pub fn session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Build the statement. No driver call is made until it is used.
    pub fn build(self) -> Statement {
        let session = self
            .session
            .unwrap_or_else(|| Arc::new(Session::new(Arc::clone(&self.driver))));
        Statement {
            driver: self.driver,
            sql: self.sql,
            is_cursor: self.is_cursor,
            handle: None,
            state: StatementState::freed(),
            bindings: HashMap::new(),
            statement_type: None,
            profile_id: None,
            profiler: self.profiler.unwrap_or_else(|| Arc::new(NoopProfiler)),
            session,
            config: self.config.unwrap_or_default(),
        }
    }
}

/// A statement shared between the cache and its users.
///
/// Cloning is cheap; every clone refers to the same statement.
#[derive(Clone)]
pub struct SharedStatement {
    sql: Arc<str>,
    inner: Arc<Mutex<Statement>>,
}

impl SharedStatement {
    pub fn new(statement: Statement) -> Self {
        Self {
            sql: Arc::clone(&statement.sql),
            inner: Arc::new(Mutex::new(statement)),
        }
    }

    /// SQL text, readable without locking.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Lock the statement for use.
    pub async fn lock(&self) -> MutexGuard<'_, Statement> {
        self.inner.lock().await
    }

    /// Lock the statement if nobody else holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Statement>> {
        self.inner.try_lock().ok()
    }

    /// Whether both refer to the same statement.
    pub fn ptr_eq(&self, other: &SharedStatement) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl AsRef<str> for SharedStatement {
    fn as_ref(&self) -> &str {
        &self.sql
    }
}

impl fmt::Debug for SharedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedStatement").field(&self.sql).finish()
    }
}
