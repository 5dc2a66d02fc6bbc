//! Fetch results.
//!
//! This module provides [`RowStream`], the lazy forward-only sequence of
//! shaped rows, and [`FetchResult`], which is either a materialized [`Rows`]
//! collection or a stream depending on the fetch strategy.

use crate::driver::FetchMode;
use crate::error::StatementError;
use crate::query::shape::{FetchShape, RowKey, Rows};
use crate::query::state::StatementState;
use crate::query::statement::Statement;
use serde_json::Value;
use tracing::{debug, trace};

/// Lazy sequence of shaped rows.
///
/// The stream mutably borrows its statement, which stays in `Fetching` until
/// the last row has been pulled, the stream is closed, or it is dropped.
/// An abandoned stream leaves the statement `Fetched`; fetching again
/// re-executes it.
pub struct RowStream<'a> {
    /// Statement owning the driver cursor
    statement: &'a mut Statement,
    /// Row transformation
    shape: FetchShape,
    /// Driver fetch mode
    mode: FetchMode,
    /// Index of the next row
    index: usize,
    /// Whether the cursor is exhausted or abandoned
    complete: bool,
}

impl<'a> RowStream<'a> {
    /// Start streaming from a statement that was just moved to `Fetching`.
    pub(crate) fn new(statement: &'a mut Statement, shape: FetchShape, mode: FetchMode) -> Self {
        Self {
            statement,
            shape,
            mode,
            index: 0,
            complete: false,
        }
    }

    /// Number of rows yielded so far.
    pub fn rows_fetched(&self) -> usize {
        self.index
    }

    /// Whether no more rows will be yielded.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Pull the next shaped row.
    ///
    /// Returns `None` once the cursor is exhausted. After an error the stream
    /// is complete.
    pub async fn next(&mut self) -> Option<Result<(RowKey, Value), StatementError>> {
        if self.complete {
            return None;
        }

        let row = match self.statement.fetch_next_row(self.mode).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                trace!(sql = %self.statement.sql(), rows = self.index, "fetch complete");
                self.finish();
                return None;
            }
            Err(e) => {
                self.finish();
                return Some(Err(e));
            }
        };

        let index = self.index;
        self.index += 1;
        match self.shape.apply(row, index) {
            Ok(pair) => Some(Ok(pair)),
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }

    /// Drain the stream into a collection. Duplicate keys keep the last value.
    pub async fn collect_rows(mut self) -> Result<Rows, StatementError> {
        let mut rows = Rows::new();
        while let Some(item) = self.next().await {
            let (key, value) = item?;
            rows.insert(key, value);
        }
        Ok(rows)
    }

    /// Abandon the remaining rows.
    pub fn close(mut self) {
        if !self.complete {
            debug!(sql = %self.statement.sql(), rows = self.index, "row stream closed");
        }
        self.finish();
    }

    fn finish(&mut self) {
        if !self.complete {
            self.complete = true;
            self.statement.set_state(StatementState::fetched());
        }
    }
}

impl std::fmt::Debug for RowStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("sql", &self.statement.sql())
            .field("shape", &self.shape)
            .field("mode", &self.mode)
            .field("index", &self.index)
            .field("complete", &self.complete)
            .finish()
    }
}

impl Drop for RowStream<'_> {
    fn drop(&mut self) {
        if !self.complete {
            debug!(sql = %self.statement.sql(), rows = self.index, "row stream dropped before exhaustion");
            self.finish();
        }
    }
}

/// Result of a fetch, eager or lazy depending on the fetch strategy.
#[derive(Debug)]
pub enum FetchResult<'a> {
    /// All rows, in fetch order
    Eager(Rows),
    /// Rows pulled on demand
    Lazy(RowStream<'a>),
}

impl FetchResult<'_> {
    /// Check if the rows are pulled on demand.
    pub fn is_lazy(&self) -> bool {
        matches!(self, FetchResult::Lazy(_))
    }

    /// Materialize the result, draining a lazy stream.
    pub async fn into_rows(self) -> Result<Rows, StatementError> {
        match self {
            FetchResult::Eager(rows) => Ok(rows),
            FetchResult::Lazy(stream) => stream.collect_rows().await,
        }
    }
}
