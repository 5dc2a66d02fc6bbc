//! Prepared statement cache.
//!
//! A capacity-bounded LRU registry of shared statements keyed by the hash of
//! their exact SQL text. Eviction frees the statement's driver handle, but
//! only for entries that are safe to free: a statement that is currently
//! locked by a user, or that is in the middle of a fetch, is skipped, so the
//! cache may temporarily hold more entries than its capacity.

use crate::query::statement::SharedStatement;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

/// Hash of a SQL text, used as the cache key.
pub fn sql_hash(sql: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    sql.hash(&mut hasher);
    hasher.finish()
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a statement
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries freed to respect the capacity
    pub evictions: u64,
    /// Statements not cached because another SQL text has the same hash
    pub collisions: u64,
}

/// LRU cache of shared statements.
///
/// The underlying `LruCache` is unbounded; capacity is enforced here so that
/// entries which cannot be freed yet are kept instead of dropped.
pub struct StatementCache {
    capacity: usize,
    lru: LruCache<u64, SharedStatement>,
    stats: CacheStats,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lru: LruCache::unbounded(),
            stats: CacheStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lru.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether a statement for this exact SQL text is cached.
    pub fn contains(&self, sql: &str) -> bool {
        self.peek(sql).is_some()
    }

    /// Cached SQL texts, least recently used first.
    pub fn sql_texts(&self) -> Vec<&str> {
        self.lru.iter().rev().map(|(_, statement)| statement.sql()).collect()
    }

    /// Look up a statement and mark it most recently used.
    pub fn get(&mut self, sql: &str) -> Option<SharedStatement> {
        self.get_hashed(sql_hash(sql), sql)
    }

    /// Look up a statement without touching recency or counters.
    pub fn peek(&self, sql: &str) -> Option<SharedStatement> {
        self.lru
            .peek(&sql_hash(sql))
            .filter(|statement| statement.sql() == sql)
            .cloned()
    }

    fn get_hashed(&mut self, hash: u64, sql: &str) -> Option<SharedStatement> {
        let matches = self.lru.peek(&hash).is_some_and(|statement| statement.sql() == sql);
        if !matches {
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        debug!(sql, "statement cache hit");
        self.lru.get(&hash).cloned()
    }

    /// Add a statement, then evict least recently used entries over capacity.
    ///
    /// Adding SQL text that is already cached is a no-op. Returns whether the
    /// statement's SQL text is cached afterwards.
    pub async fn add(&mut self, statement: SharedStatement) -> bool {
        let hash = sql_hash(statement.sql());
        self.add_hashed(hash, statement).await
    }

    async fn add_hashed(&mut self, hash: u64, statement: SharedStatement) -> bool {
        if let Some(cached) = self.lru.peek(&hash) {
            if cached.sql() == statement.sql() {
                return true;
            }
            warn!(
                cached = cached.sql(),
                sql = statement.sql(),
                "statement cache hash collision, statement not cached"
            );
            self.stats.collisions += 1;
            return false;
        }

        self.lru.put(hash, statement);
        self.collect_garbage().await;
        self.lru.contains(&hash)
    }

    /// Remove the entry for a statement or SQL text without freeing it.
    pub fn remove(&mut self, sql: impl AsRef<str>) -> bool {
        let sql = sql.as_ref();
        let hash = sql_hash(sql);
        let matches = self.lru.peek(&hash).is_some_and(|statement| statement.sql() == sql);
        matches && self.lru.pop(&hash).is_some()
    }

    /// Change the capacity, evicting entries if it shrank.
    pub async fn set_cache_size(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.collect_garbage().await;
    }

    /// Free and remove every entry.
    ///
    /// Statements locked by another holder are removed without being freed;
    /// their handles are released when the last holder drops them.
    pub async fn clear(&mut self) {
        while let Some((_, statement)) = self.lru.pop_lru() {
            let Some(mut guard) = statement.try_lock() else {
                debug!(sql = statement.sql(), "cached statement in use, not freed");
                continue;
            };
            if let Err(e) = guard.free().await {
                warn!(sql = statement.sql(), error = %e, "failed to free cached statement");
            }
        }
    }

    /// Evict least recently used entries that are safe to free until the
    /// cache fits its capacity or no candidate is left.
    async fn collect_garbage(&mut self) {
        if self.lru.len() <= self.capacity {
            return;
        }

        let mut excess = self.lru.len() - self.capacity;
        let candidates: Vec<(u64, SharedStatement)> = self
            .lru
            .iter()
            .rev()
            .map(|(hash, statement)| (*hash, statement.clone()))
            .collect();

        for (hash, statement) in candidates {
            if excess == 0 {
                break;
            }
            if try_free(&statement).await {
                self.lru.pop(&hash);
                self.stats.evictions += 1;
                excess -= 1;
                debug!(sql = statement.sql(), "statement evicted");
            }
        }

        if excess > 0 {
            debug!(
                len = self.lru.len(),
                capacity = self.capacity,
                "statement cache over capacity, remaining entries are in use"
            );
        }
    }
}

/// Free a cached statement if nobody holds it and it is not mid-fetch.
async fn try_free(statement: &SharedStatement) -> bool {
    let Some(mut guard) = statement.try_lock() else {
        debug!(sql = statement.sql(), "statement in use, eviction skipped");
        return false;
    };
    if !guard.can_be_freed() {
        debug!(sql = statement.sql(), state = %guard.state(), "statement not safe to free, eviction skipped");
        return false;
    }
    if let Err(e) = guard.free().await {
        warn!(sql = statement.sql(), error = %e, "failed to free evicted statement");
    }
    true
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.sql_texts())
            .field("stats", &self.stats)
            .finish()
    }
}
