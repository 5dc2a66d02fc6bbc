//! Execution context of one connection.
//!
//! The session records which SQL text was executed last, counts executions,
//! tracks whether uncommitted work is pending and delegates commit and
//! rollback to the driver.

use crate::driver::{ExecuteMode, SharedDriver};
use crate::error::DriverError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Execution context shared by the statements of one connection.
pub struct Session {
    /// Connection the session runs on
    driver: SharedDriver,

    /// SQL text of the last successful execution
    last_sql: RwLock<Option<Arc<str>>>,

    /// Last activity timestamp
    last_activity: RwLock<Instant>,

    /// Execution counter
    executions: AtomicU64,

    /// Uncommitted work pending
    in_transaction: AtomicBool,
}

impl Session {
    /// Create a new session on a connection.
    pub fn new(driver: SharedDriver) -> Self {
        Self {
            driver,
            last_sql: RwLock::new(None),
            last_activity: RwLock::new(Instant::now()),
            executions: AtomicU64::new(0),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Connection of this session.
    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    /// Record a successful execution in the given mode.
    pub async fn record_execution(&self, sql: &Arc<str>, mode: ExecuteMode) {
        *self.last_sql.write().await = Some(Arc::clone(sql));
        *self.last_activity.write().await = Instant::now();
        self.executions.fetch_add(1, Ordering::Relaxed);
        if mode.contains(ExecuteMode::COMMIT_ON_SUCCESS) {
            self.in_transaction.store(false, Ordering::Relaxed);
        } else if !mode.is_describe_only() {
            self.in_transaction.store(true, Ordering::Relaxed);
        }
    }

    /// SQL text of the last executed statement.
    pub async fn last_sql(&self) -> Option<Arc<str>> {
        self.last_sql.read().await.clone()
    }

    /// Number of successful executions.
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    /// Whether an execution left uncommitted work behind.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Relaxed)
    }

    /// Time since the last execution or transaction call.
    pub async fn idle_duration(&self) -> Duration {
        self.last_activity.read().await.elapsed()
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> Result<(), DriverError> {
        self.driver.lock().await.commit().await?;
        self.finish_transaction("commit").await;
        Ok(())
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> Result<(), DriverError> {
        self.driver.lock().await.rollback().await?;
        self.finish_transaction("rollback").await;
        Ok(())
    }

    async fn finish_transaction(&self, action: &str) {
        self.in_transaction.store(false, Ordering::Relaxed);
        *self.last_activity.write().await = Instant::now();
        debug!(action, "transaction finished");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("executions", &self.execution_count())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}
