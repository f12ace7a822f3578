//! One-shot query helpers
//!
//! Each helper runs a single statement inside its own transaction scope:
//! the statement is committed if it succeeds and rolled back if it fails.

mod iter;


pub use iter::RowIter;

use txpool_core::{Cursor, IsolationLevel, Result, Row, TxpoolError, Value};

use crate::pool::ConnectionPool;

impl ConnectionPool {
    /// Execute a statement, returning the number of affected rows
    ///
    /// The cursor's `row_count` is preferred when the driver reports one.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        isolation: Option<IsolationLevel>,
    ) -> Result<u64> {
        let mut scope = self.begin(isolation).await?;
        let outcome: Result<u64> = async {
            let mut cursor = scope.cursor().await?;
            let affected = cursor.execute(sql, params).await?;
            Ok::<_, TxpoolError>(cursor.row_count().unwrap_or(affected))
        }
        .await;
        scope.finish(outcome).await
    }

    /// Execute a query and return its first row, if any
    pub async fn fetch_one(
        &self,
        sql: &str,
        params: &[Value],
        isolation: Option<IsolationLevel>,
    ) -> Result<Option<Row>> {
        let mut scope = self.begin(isolation).await?;
        let outcome: Result<Option<Row>> = async {
            let mut cursor = scope.cursor().await?;
            cursor.execute(sql, params).await?;
            cursor.fetch_one().await
        }
        .await;
        scope.finish(outcome).await
    }

    /// Execute a query and return all of its rows
    pub async fn fetch_all(
        &self,
        sql: &str,
        params: &[Value],
        isolation: Option<IsolationLevel>,
    ) -> Result<Vec<Row>> {
        let mut scope = self.begin(isolation).await?;
        let outcome: Result<Vec<Row>> = async {
            let mut cursor = scope.cursor().await?;
            cursor.execute(sql, params).await?;
            cursor.fetch_all().await
        }
        .await;
        scope.finish(outcome).await
    }

    /// Execute a query and return a lazy iterator over its rows
    ///
    /// Rows are fetched `fetch_batch_size` at a time. The iterator holds the
    /// checkout until it is exhausted, closed or committed; see `RowIter`
    /// for how an abandoned iterator resolves its transaction.
    pub async fn fetch_iter(
        &self,
        sql: &str,
        params: &[Value],
        isolation: Option<IsolationLevel>,
    ) -> Result<RowIter> {
        let mut scope = self.begin(isolation).await?;
        let started: Result<Box<dyn Cursor>> = async {
            let mut cursor = scope.cursor().await?;
            cursor.execute(sql, params).await?;
            Ok::<_, TxpoolError>(cursor)
        }
        .await;
        match started {
            Ok(cursor) => Ok(RowIter::new(scope, cursor, self.config().fetch_batch_size())),
            Err(e) => scope.finish(Err(e)).await,
        }
    }
}
