//! txpool core - Driver-facing abstractions for the txpool connection pool
//!
//! This crate defines the contract a database driver has to satisfy in order
//! to be pooled:
//!
//! - `Connection` - A transactional connection (commit, rollback, isolation)
//! - `Cursor` - Statement execution and row fetching
//! - `Pollable` - The non-blocking readiness protocol used while waiting on I/O
//! - Common types like `Value`, `Row`, `IsolationLevel` and `TxpoolError`

mod connection;
mod error;
mod poll;
pub mod transaction;
mod types;

pub use connection::*;
pub use error::*;
pub use poll::*;
pub use transaction::*;
pub use types::*;
