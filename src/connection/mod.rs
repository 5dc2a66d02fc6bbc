//! Connection-level context for statements.
//!
//! This module provides the statement layer configuration and the session
//! that tracks executions on one connection.
//!
//! # Example
//!
//! ```
//! # use ocistmt_rs::connection::{FetchStrategy, StatementConfig};
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Using the builder
//! let config = StatementConfig::builder()
//!     .cache_size(50)
//!     .strategy(FetchStrategy::Lazy)
//!     .build()?;
//!
//! // Or parse from a configuration string
//! let config: StatementConfig = "cache_size=50;strategy=lazy".parse()?;
//! # Ok(())
//! # }
//! ```

pub mod params;
pub mod session;

pub use params::{ConfigBuilder, FetchStrategy, StatementConfig, DEFAULT_CACHE_SIZE};
pub use session::Session;
