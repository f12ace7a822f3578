//! txpool connection - Bounded transactional connection pooling
//!
//! This crate shares a capped set of database connections between many
//! concurrently running tasks:
//!
//! - `pool` - Bounded pool with FIFO waiting when every connection is in use
//! - `scope` - Commit-or-rollback checkouts that always return or discard
//!   the connection
//! - `query` - One-shot execute/fetch helpers and lazy row iteration
//! - `wait` - Cooperative waiting on driver sockets through the tokio reactor

pub mod pool;
pub mod query;
pub mod scope;
pub mod wait;

#[cfg(test)]
mod testing;

pub use pool::{ConnectionFactory, ConnectionPool, FnFactory, PoolConfig, PoolStats};
pub use query::RowIter;
pub use scope::TransactionScope;
pub use wait::{SocketWaiter, WaitCallback};
