//! Transactional checkouts
//!
//! A `TransactionScope` wraps one checkout in commit-or-rollback semantics:
//!
//! 1. a connection is acquired and, if requested, switched to an isolation
//!    level for the duration of the scope,
//! 2. the caller does its work through `connection()` or `cursor()`,
//! 3. the scope is resolved: committed on success, rolled back on failure,
//!    and thrown away if the connection turned out to be closed,
//! 4. a usable connection gets its resting isolation level back and returns
//!    to the pool.
//!
//! A connection found closed is never returned to the pool. When a unit of
//! work fails on a closed connection, the idle connections are drained too:
//! whatever killed one session has likely killed the ones idling beside it.
//!
//! # Example
//!
//! ```ignore
//! let mut scope = pool.begin(Some(IsolationLevel::Serializable)).await?;
//! let outcome = async {
//!     let mut cursor = scope.cursor().await?;
//!     let sql = "UPDATE accounts SET balance = balance - 10 WHERE id = $1";
//!     cursor.execute(sql, &[1.into()]).await
//! }
//! .await;
//! let updated = scope.finish(outcome).await?;
//! ```

use std::fmt;

use futures::future::BoxFuture;
use txpool_core::{Connection, Cursor, IsolationLevel, Result, TxpoolError};

use crate::pool::{ConnectionPool, Lease};


/// One transactional checkout of a pooled connection
///
/// Resolve it with `commit`, `rollback` or `finish`. A scope dropped without
/// being resolved (an early return, a cancelled task) rolls back in a
/// background task on the current tokio runtime and then returns the
/// connection; without a runtime the connection is discarded.
pub struct TransactionScope {
    lease: Option<Lease>,
    /// Isolation level to put back before the connection is reused
    restore: Option<IsolationLevel>,
}

impl ConnectionPool {
    /// Check out a connection inside a transaction scope
    ///
    /// If `isolation` differs from the connection's current level it is set
    /// for this scope and restored afterwards; if it already matches, nothing
    /// is changed.
    pub async fn begin(&self, isolation: Option<IsolationLevel>) -> Result<TransactionScope> {
        let lease = self.lease().await?;
        let mut scope = TransactionScope {
            lease: Some(lease),
            restore: None,
        };

        if let Some(level) = isolation {
            let current = scope.connection().isolation_level();
            if current != level {
                // Recorded before the switch so a cancelled `begin` still restores
                scope.restore = Some(current);
                let switched = scope.connection().set_isolation_level(level).await;
                if let Err(e) = switched {
                    return scope.finish(Err(e)).await;
                }
                tracing::trace!(from = %current, to = %level, "switched isolation level");
            }
        }

        Ok(scope)
    }

    /// Run `work` inside a transaction scope and resolve it by the outcome
    ///
    /// Errors returned by `work` come back unchanged after the rollback (or
    /// discard) has completed; pool failures are converted into `E`.
    ///
    /// ```ignore
    /// let rows = pool
    ///     .transaction(None, |conn| {
    ///         Box::pin(async move {
    ///             let mut cursor = conn.cursor().await?;
    ///             cursor.execute("DELETE FROM sessions WHERE expired", &[]).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, E, F>(
        &self,
        isolation: Option<IsolationLevel>,
        work: F,
    ) -> std::result::Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, std::result::Result<T, E>>,
        E: From<TxpoolError>,
    {
        let mut scope = self.begin(isolation).await?;
        let outcome = work(scope.connection()).await;
        scope.finish(outcome).await
    }
}

impl TransactionScope {
    /// The checked-out connection
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.lease
            .as_mut()
            .expect("transaction scope already resolved")
            .conn()
    }

    /// Open a cursor on the checked-out connection
    pub async fn cursor(&mut self) -> Result<Box<dyn Cursor>> {
        self.connection().cursor().await
    }

    /// The level that will be restored on return, if this scope changed it
    pub fn restore_level(&self) -> Option<IsolationLevel> {
        self.restore
    }

    fn take(&mut self) -> (Lease, Option<IsolationLevel>) {
        let lease = self
            .lease
            .take()
            .expect("transaction scope already resolved");
        (lease, self.restore.take())
    }

    /// Commit the transaction and return the connection to the pool
    ///
    /// Fails with `TxpoolError::CommitOnClosed` if the connection closed
    /// during the scope; it is discarded without a commit attempt. If the
    /// commit itself fails, a rollback is attempted so the connection can be
    /// reused, and the commit error is returned.
    pub async fn commit(mut self) -> Result<()> {
        let (mut lease, restore) = self.take();

        if lease.is_closed() {
            let described = lease.describe();
            tracing::warn!(connection = %described, "connection closed before commit, discarding");
            lease.discard().await;
            return Err(TxpoolError::CommitOnClosed(described));
        }

        if let Err(e) = lease.conn().commit().await {
            tracing::warn!(error = %e, "commit failed");
            if lease.is_closed() {
                lease.discard().await;
                return Err(e);
            }
            match lease.conn().rollback().await {
                Ok(()) => give_back(lease, restore).await,
                Err(rollback) => {
                    tracing::error!(error = %rollback, "rollback after failed commit failed");
                    lease.discard().await;
                }
            }
            return Err(e);
        }

        give_back(lease, restore).await;
        Ok(())
    }

    /// Roll the transaction back and return the connection to the pool
    ///
    /// A closed connection is discarded without a rollback attempt and the
    /// idle connections are drained. A failed rollback discards the
    /// connection and is reported as `TxpoolError::RollbackFailed`.
    pub async fn rollback(mut self) -> Result<()> {
        let (mut lease, restore) = self.take();

        if lease.is_closed() {
            tracing::warn!(
                connection = %lease.describe(),
                "connection closed during transaction, draining idle connections"
            );
            let pool = lease.pool();
            lease.discard().await;
            pool.drain_and_close_all().await;
            return Ok(());
        }

        match lease.conn().rollback().await {
            Ok(()) => {
                give_back(lease, restore).await;
                Ok(())
            }
            Err(e) => {
                lease.discard().await;
                Err(TxpoolError::RollbackFailed(Box::new(e)))
            }
        }
    }

    /// Resolve the scope from the outcome of the caller's work
    ///
    /// `Ok` commits; `Err` rolls back and hands the original error back
    /// unchanged. A rollback failure on that path is logged, never returned
    /// in place of the original error.
    pub async fn finish<T, E>(
        self,
        outcome: std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<TxpoolError>,
    {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.rollback().await {
                    tracing::error!(error = %rollback, "rollback failed after unit of work error");
                }
                Err(e)
            }
        }
    }
}

/// Restore the resting isolation level and put the connection back
///
/// A connection that cannot be restored, or that closed in the meantime, is
/// discarded instead.
async fn give_back(mut lease: Lease, restore: Option<IsolationLevel>) {
    if let Some(level) = restore.filter(|level| lease.conn().isolation_level() != *level) {
        if let Err(e) = lease.conn().set_isolation_level(level).await {
            tracing::warn!(error = %e, level = %level, "failed to restore isolation level");
            lease.discard().await;
            return;
        }
    }

    if lease.is_closed() {
        lease.discard().await;
    } else {
        lease.release();
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        let Some(mut lease) = self.lease.take() else {
            return;
        };
        if lease.is_closed() {
            tracing::warn!(
                connection = %lease.describe(),
                "unresolved transaction scope on a closed connection, discarding"
            );
            return;
        }

        let restore = self.restore.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!("transaction scope dropped without being resolved, rolling back");
                handle.spawn(async move {
                    match lease.conn().rollback().await {
                        Ok(()) => give_back(lease, restore).await,
                        Err(e) => {
                            tracing::error!(error = %e, "background rollback failed");
                            lease.discard().await;
                        }
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "transaction scope dropped outside a runtime, discarding connection"
                );
            }
        }
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionScope")
            .field(
                "connection",
                &self.lease.as_ref().map(|lease| lease.describe()),
            )
            .field("restore", &self.restore)
            .finish()
    }
}
