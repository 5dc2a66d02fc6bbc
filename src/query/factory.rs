//! Statement factory.
//!
//! The factory ties one connection to a statement cache, a profiler, a
//! session and the configuration every statement it creates shares.

use crate::connection::{Session, StatementConfig};
use crate::driver::SharedDriver;
use crate::error::StatementError;
use crate::profiler::{Profiler, TracingProfiler};
use crate::query::cache::{CacheStats, StatementCache};
use crate::query::statement::{SharedStatement, StatementBuilder};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Creates and caches statements for one connection.
///
/// # Example
///
/// ```no_run
/// # use ocistmt_rs::{SharedDriver, StatementConfig, StatementFactory};
/// # async fn example(driver: SharedDriver) -> Result<(), Box<dyn std::error::Error>> {
/// let factory = StatementFactory::new(driver, StatementConfig::default());
///
/// let statement = factory.statement("SELECT name FROM users WHERE id = :id").await?;
/// let mut statement = statement.lock().await;
/// statement.bind([(":id", 7)]).await?;
/// let name = statement.fetch_value("NAME").await?;
/// # Ok(())
/// # }
/// ```
pub struct StatementFactory {
    driver: SharedDriver,
    config: StatementConfig,
    profiler: Arc<dyn Profiler>,
    session: Arc<Session>,
    cache: Mutex<StatementCache>,
}

impl StatementFactory {
    /// Create a factory with a `tracing` profiler.
    pub fn new(driver: SharedDriver, config: StatementConfig) -> Self {
        let session = Arc::new(Session::new(Arc::clone(&driver)));
        let cache = Mutex::new(StatementCache::new(config.cache_size));
        Self {
            driver,
            config,
            profiler: Arc::new(TracingProfiler::new()),
            session,
            cache,
        }
    }

    /// Replace the profiler used by statements created from now on.
    pub fn with_profiler(mut self, profiler: Arc<dyn Profiler>) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn config(&self) -> &StatementConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn driver(&self) -> &SharedDriver {
        &self.driver
    }

    fn builder(&self, sql: &str) -> StatementBuilder {
        StatementBuilder::new(Arc::clone(&self.driver), sql)
            .config(self.config.clone())
            .profiler(Arc::clone(&self.profiler))
            .session(Arc::clone(&self.session))
    }

    /// Get a prepared statement for SQL text.
    ///
    /// A cached statement is reused when nobody holds it and it is not
    /// fetching; otherwise a fresh, uncached statement is returned. On a
    /// cache miss the new statement is prepared and cached.
    ///
    /// # Errors
    ///
    /// Returns the driver error if preparing fails; nothing is cached then.
    pub async fn statement(&self, sql: &str) -> Result<SharedStatement, StatementError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(sql) {
            let reusable = cached
                .try_lock()
                .map(|statement| statement.can_be_freed())
                .unwrap_or(false);
            if reusable {
                return Ok(cached);
            }

            drop(cache);
            debug!(sql, "cached statement in use, creating an uncached one");
            let mut statement = self.builder(sql).build();
            statement.prepare().await?;
            return Ok(SharedStatement::new(statement));
        }

        let mut statement = self.builder(sql).build();
        statement.prepare().await?;
        let shared = SharedStatement::new(statement);
        {
            // Locked so its own insertion cannot evict it
            let _guard = shared.lock().await;
            cache.add(shared.clone()).await;
        }
        Ok(shared)
    }

    /// Create a prepared cursor statement. Cursors are never cached.
    pub async fn cursor(&self) -> Result<SharedStatement, StatementError> {
        let mut statement = StatementBuilder::cursor(Arc::clone(&self.driver))
            .config(self.config.clone())
            .profiler(Arc::clone(&self.profiler))
            .session(Arc::clone(&self.session))
            .build();
        statement.prepare().await?;
        Ok(SharedStatement::new(statement))
    }

    /// The cached statement executed last on this connection.
    pub async fn last_statement(&self) -> Option<SharedStatement> {
        let sql = self.session.last_sql().await?;
        self.cache.lock().await.peek(&sql)
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> Result<(), StatementError> {
        Ok(self.session.commit().await?)
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> Result<(), StatementError> {
        Ok(self.session.rollback().await?)
    }

    /// Change the cache capacity.
    pub async fn set_cache_size(&self, cache_size: usize) {
        self.cache.lock().await.set_cache_size(cache_size).await;
    }

    /// Free and drop every cached statement.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear().await;
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.lock().await.stats()
    }

    /// Number of cached statements.
    pub async fn cached_statements(&self) -> usize {
        self.cache.lock().await.len()
    }
}

impl std::fmt::Debug for StatementFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementFactory")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::{mock_connection, shared};
    use crate::driver::{ExecuteMode, StatementHandle};
    use crate::error::DriverError;
    use crate::profiler::NoopProfiler;
    use crate::query::state::StatementState;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn factory(cache_size: usize) -> StatementFactory {
        let counter = Arc::new(AtomicU64::new(0));
        let mut mock = mock_connection();
        mock.expect_parse()
            .returning(move |_| Ok(StatementHandle(counter.fetch_add(1, Ordering::Relaxed) + 1)));
        mock.expect_new_cursor().returning(|| Ok(StatementHandle(100)));
        mock.expect_execute().returning(|_, _| Ok(()));
        mock.expect_free().returning(|_| Ok(()));
        mock.expect_commit().returning(|| Ok(()));
        let config = StatementConfig::builder().cache_size(cache_size).build().unwrap();
        StatementFactory::new(shared(mock), config).with_profiler(Arc::new(NoopProfiler))
    }

    #[tokio::test]
    async fn test_statement_is_cached_and_reused() {
        let factory = factory(4);
        let first = factory.statement("SELECT 1 FROM DUAL").await.unwrap();
        assert_eq!(first.lock().await.state(), StatementState::Prepared);

        let second = factory.statement("SELECT 1 FROM DUAL").await.unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(factory.cached_statements().await, 1);
        assert_eq!(factory.cache_stats().await.hits, 1);
    }

    #[tokio::test]
    async fn test_statement_in_use_is_not_shared() {
        let factory = factory(4);
        let first = factory.statement("SELECT 1 FROM DUAL").await.unwrap();
        let guard = first.lock().await;

        let second = factory.statement("SELECT 1 FROM DUAL").await.unwrap();
        assert!(!first.ptr_eq(&second));
        assert_eq!(second.lock().await.handle(), Some(StatementHandle(2)));
        assert_eq!(guard.handle(), Some(StatementHandle(1)));
        assert_eq!(factory.cached_statements().await, 1);
    }

    #[tokio::test]
    async fn test_prepare_failure_is_not_cached() {
        let mut mock = mock_connection();
        mock.expect_parse().returning(|sql| {
            Err(DriverError::Parse {
                sql: sql.to_string(),
                message: "ORA-00900".to_string(),
            })
        });
        let factory = StatementFactory::new(shared(mock), StatementConfig::default());

        assert!(factory.statement("SELEC 1").await.is_err());
        assert_eq!(factory.cached_statements().await, 0);
    }

    #[tokio::test]
    async fn test_cursor_is_not_cached() {
        let factory = factory(4);
        let cursor = factory.cursor().await.unwrap();
        assert!(cursor.lock().await.is_cursor());
        assert_eq!(cursor.lock().await.handle(), Some(StatementHandle(100)));
        assert_eq!(factory.cached_statements().await, 0);
    }

    #[tokio::test]
    async fn test_last_statement_follows_execution() {
        let factory = factory(4);
        assert!(factory.last_statement().await.is_none());

        let update = factory.statement("UPDATE t SET x = 1").await.unwrap();
        let select = factory.statement("SELECT x FROM t").await.unwrap();
        update.lock().await.execute(None).await.unwrap();
        assert!(factory.last_statement().await.unwrap().ptr_eq(&update));

        select
            .lock()
            .await
            .execute(Some(ExecuteMode::NO_AUTO_COMMIT))
            .await
            .unwrap();
        assert!(factory.last_statement().await.unwrap().ptr_eq(&select));
        assert!(factory.session().in_transaction());

        factory.commit().await.unwrap();
        assert!(!factory.session().in_transaction());
    }

    #[tokio::test]
    async fn test_cache_size_and_clear() {
        let factory = factory(3);
        let a = factory.statement("A").await.unwrap();
        factory.statement("B").await.unwrap();
        factory.statement("C").await.unwrap();

        factory.set_cache_size(2).await;
        assert_eq!(factory.cached_statements().await, 2);
        assert_eq!(a.lock().await.state(), StatementState::Freed);

        factory.clear_cache().await;
        assert_eq!(factory.cached_statements().await, 0);
    }
}
