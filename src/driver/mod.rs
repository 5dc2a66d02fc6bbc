//! Driver boundary.
//!
//! The statement layer never talks to a database directly: everything goes
//! through the [`Driver`] trait, which parses, binds, executes and fetches on
//! opaque [`StatementHandle`]s.
//!
//! # Architecture
//!
//! - `protocol` - the `Driver` trait and the shared connection type
//! - `messages` - handles, mode flags, bind values and rows

pub mod messages;
pub mod protocol;

#[cfg(test)]
pub(crate) mod testing;

pub use messages::{
    BindType, BindValue, ExecuteMode, FetchMode, FieldDescription, Row, StatementHandle,
    StatementType,
};
pub use protocol::{Driver, SharedDriver};
