//! Statement lifecycle, binding, row shaping and caching.
//!
//! # Overview
//!
//! The query module is organized into:
//! - `state` - lifecycle state of a statement handle
//! - `host_var` - host variable normalization and resolution
//! - `shape` - row transformation strategies
//! - `statement` - the stateful statement and its builder
//! - `results` - lazy row streams and eager-or-lazy results
//! - `cache` - LRU cache of prepared statements
//! - `factory` - statement creation on one connection
//!
//! # Example
//!
//! ```no_run
//! use ocistmt_rs::query::{FetchShape, RowKey, Statement};
//! use ocistmt_rs::SharedDriver;
//!
//! # async fn example(driver: SharedDriver) -> Result<(), Box<dyn std::error::Error>> {
//! let mut statement = Statement::new(driver, "SELECT id, name FROM users");
//!
//! // id => name pairs
//! let names = statement.fetch_all(FetchShape::pairs(), None).await?;
//! println!("{:?}", names.get(&RowKey::Int(1)));
//!
//! // Stream rows one by one
//! let mut stream = statement.stream(FetchShape::Assoc, None).await?;
//! while let Some(row) = stream.next().await {
//!     let (_, record) = row?;
//!     println!("{}", record);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod factory;
pub mod host_var;
pub mod results;
pub mod shape;
pub mod state;
pub mod statement;

// Re-export commonly used types
pub use cache::{CacheStats, StatementCache};
pub use factory::StatementFactory;
pub use host_var::{BindInput, HostValue, HostVariable};
pub use results::{FetchResult, RowStream};
pub use shape::{Column, FetchShape, Mapped, RowCallback, RowKey, Rows};
pub use state::StatementState;
pub use statement::{SharedStatement, Statement, StatementBuilder};
