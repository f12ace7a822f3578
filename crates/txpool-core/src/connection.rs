//! Connection and cursor traits

use crate::{IsolationLevel, Result, Row, Value};
use async_trait::async_trait;

/// A statement cursor obtained from a connection
///
/// Cursors are owned values so they can outlive the borrow that created them
/// (a lazy row iterator keeps one alongside its checkout). Drivers typically
/// share the session with the connection internally; a cursor must not be
/// used after its connection has been committed, rolled back or closed.
#[async_trait]
pub trait Cursor: Send {
    /// Execute a statement, returning the number of affected rows
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Fetch the next row of the current result set
    async fn fetch_one(&mut self) -> Result<Option<Row>>;

    /// Fetch every remaining row of the current result set
    async fn fetch_all(&mut self) -> Result<Vec<Row>>;

    /// Fetch up to `size` rows; an empty batch means the result set is exhausted
    async fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>>;

    /// Rows affected or produced by the last `execute`, if known
    fn row_count(&self) -> Option<u64> {
        None
    }
}

/// A pooled database connection
///
/// Blocking driver operations are expected to wait through the pool's
/// `WaitCallback` (handed over when the connection is created) so that a task
/// waiting on the network yields to the rest of the runtime.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Whether the server side of the session has gone away
    ///
    /// Drivers flip this when they observe a broken socket, so it can become
    /// true in the middle of a unit of work.
    fn is_closed(&self) -> bool;

    /// The isolation level currently in effect for new transactions
    fn isolation_level(&self) -> IsolationLevel;

    /// Change the isolation level used for subsequent transactions
    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&mut self) -> Result<()>;

    /// Open a cursor on this connection
    async fn cursor(&mut self) -> Result<Box<dyn Cursor>>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;

    /// Short human readable description used in error messages and logs
    fn describe(&self) -> String {
        format!("<{} connection>", self.driver_name())
    }
}
