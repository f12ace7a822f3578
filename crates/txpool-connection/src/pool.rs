//! Bounded connection pool
//!
//! The pool caps the number of live connections, keeps returned connections
//! in a FIFO idle queue, and parks callers in arrival order when every
//! connection is checked out.
//!
//! # Example
//!
//! ```ignore
//! use txpool_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(3)?.with_wait_timeout_ms(5_000);
//! let pool = ConnectionPool::new(config, factory);
//!
//! let conn = pool.acquire().await?;
//! // Use connection...
//! pool.release(conn);
//! ```

mod config;
mod lease;
mod pool;
mod stats;


pub use config::PoolConfig;
pub(crate) use lease::Lease;
pub use pool::{ConnectionFactory, ConnectionPool, FnFactory};
pub use stats::PoolStats;
