//! Execution profiling hooks.
//!
//! Every statement execution is wrapped in a profiler span: `start` is called
//! with the SQL text and the `name=value` bindings before the driver executes, `stop`
//! afterwards, whether execution succeeded or not.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Identifier of an open profiling span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileId(pub u64);

/// Span hooks around statement execution.
pub trait Profiler: Send + Sync + fmt::Debug {
    /// Open a span for one execution.
    fn start(&self, sql: &str, bindings: &[String]) -> ProfileId;

    /// Close a span.
    fn stop(&self, id: ProfileId);
}

/// Profiler that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn start(&self, _sql: &str, _bindings: &[String]) -> ProfileId {
        ProfileId(0)
    }

    fn stop(&self, _id: ProfileId) {}
}

/// Profiler that reports spans through `tracing`.
#[derive(Debug, Default)]
pub struct TracingProfiler {
    next_id: AtomicU64,
    open: Mutex<HashMap<ProfileId, Instant>>,
}

impl TracingProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spans started but not stopped.
    pub fn open_spans(&self) -> usize {
        self.open.lock().map(|open| open.len()).unwrap_or(0)
    }

    fn finish(&self, id: ProfileId) -> Option<Duration> {
        let mut open = self.open.lock().ok()?;
        open.remove(&id).map(|started| started.elapsed())
    }
}

impl Profiler for TracingProfiler {
    fn start(&self, sql: &str, bindings: &[String]) -> ProfileId {
        let id = ProfileId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        if let Ok(mut open) = self.open.lock() {
            open.insert(id, Instant::now());
        }
        debug!(profile_id = id.0, sql, bindings = ?bindings, "execute started");
        id
    }

    fn stop(&self, id: ProfileId) {
        match self.finish(id) {
            Some(elapsed) => {
                debug!(profile_id = id.0, elapsed_us = elapsed.as_micros() as u64, "execute finished")
            }
            None => debug!(profile_id = id.0, "stop for unknown profile span"),
        }
    }
}
