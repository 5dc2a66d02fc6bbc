//! # ocistmt-rs
//!
//! Stateful prepared statements, an LRU statement cache and row shaping over
//! a pluggable database driver.
//!
//! The crate does not talk to a database itself. A [`Driver`] implementation
//! parses, binds, executes and fetches on opaque handles; this crate tracks
//! the lifecycle of those handles, reuses them across calls for identical SQL
//! text, and turns fetched rows into arrays, records, pairs, maps or typed
//! values, either eagerly or as a stream.
//!
//! ## Example
//!
//! ```no_run
//! # use ocistmt_rs::*;
//! # async fn example(driver: SharedDriver) -> Result<(), Box<dyn std::error::Error>> {
//! let factory = StatementFactory::new(driver, "cache_size=50".parse()?);
//!
//! // Prepared once, reused for identical SQL text
//! let statement = factory
//!     .statement("SELECT id, name FROM users WHERE dept = :dept")
//!     .await?;
//!
//! let mut statement = statement.lock().await;
//! statement.bind([(":dept", "R&D")]).await?;
//!
//! let names = statement.fetch_all(FetchShape::pairs(), None).await?;
//! for (id, name) in &names {
//!     println!("{} => {}", id, name);
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod connection;
pub mod driver;
pub mod error;
pub mod profiler;
pub mod query;

// Re-export public API
pub use connection::{FetchStrategy, Session, StatementConfig};
pub use driver::{
    BindType, BindValue, Driver, ExecuteMode, FetchMode, FieldDescription, Row, SharedDriver,
    StatementHandle, StatementType,
};
pub use error::{ConfigError, DriverError, Error, ErrorCode, StatementError};
pub use profiler::{NoopProfiler, ProfileId, Profiler, TracingProfiler};
pub use query::{
    Column, FetchResult, FetchShape, HostVariable, RowKey, RowStream, Rows, SharedStatement,
    Statement, StatementCache, StatementFactory, StatementState,
};
