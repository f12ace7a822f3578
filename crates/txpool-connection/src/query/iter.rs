//! Lazy, batch-fetching row iteration

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;

use futures::Stream;
use txpool_core::{Cursor, Result, Row};

use crate::scope::TransactionScope;

/// A finite, non-restartable sequence of rows fetched in batches
///
/// The iterator owns the transaction scope its query runs in. Rows are pulled
/// with `fetch_many` whenever the local buffer runs dry; the first empty
/// batch ends the sequence and commits the scope. A fetch error rolls the
/// scope back and is returned once, after which the sequence is over.
///
/// The caller drives the iteration and therefore decides when the
/// transaction resolves:
///
/// - `close` abandons the remaining rows and rolls back.
/// - `commit` commits immediately, even with the cursor mid-stream. Rows
///   that were never fetched are lost and whatever the driver does with an
///   open cursor at commit time applies; this is the caller's call to make.
/// - Dropping an unfinished iterator resolves through the scope's drop path
///   (a background rollback), which is a caller error rather than something
///   the iterator tries to paper over.
pub struct RowIter {
    cursor: Option<Box<dyn Cursor>>,
    scope: Option<TransactionScope>,
    buffer: VecDeque<Row>,
    batch_size: usize,
    exhausted: bool,
    fetched: u64,
}

impl RowIter {
    pub(crate) fn new(scope: TransactionScope, cursor: Box<dyn Cursor>, batch_size: usize) -> Self {
        Self {
            cursor: Some(cursor),
            scope: Some(scope),
            buffer: VecDeque::new(),
            batch_size: batch_size.max(1),
            exhausted: false,
            fetched: 0,
        }
    }

    /// Override the number of rows requested per batch
    pub fn with_batch_size(mut self, batch_size: NonZeroUsize) -> Self {
        self.batch_size = batch_size.get();
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Whether the sequence has ended (drained, failed, or resolved)
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }

    /// Rows fetched from the cursor so far
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    /// Get the next row, fetching a new batch when the buffer is empty
    ///
    /// Returns `Ok(None)` once the sequence has ended, and keeps doing so.
    pub async fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.exhausted {
                return Ok(None);
            }
            let Some(cursor) = self.cursor.as_mut() else {
                self.exhausted = true;
                return Ok(None);
            };

            match cursor.fetch_many(self.batch_size).await {
                Ok(batch) if batch.is_empty() => {
                    self.end();
                    if let Some(scope) = self.scope.take() {
                        scope.commit().await?;
                    }
                    return Ok(None);
                }
                Ok(batch) => {
                    self.fetched += batch.len() as u64;
                    self.buffer.extend(batch);
                }
                Err(e) => {
                    self.end();
                    return match self.scope.take() {
                        Some(scope) => scope.finish(Err(e)).await,
                        None => Err(e),
                    };
                }
            }
        }
    }

    fn end(&mut self) {
        self.exhausted = true;
        self.cursor = None;
    }

    /// Stop iterating and roll the transaction back
    pub async fn close(mut self) -> Result<()> {
        self.end();
        self.buffer.clear();
        match self.scope.take() {
            Some(scope) => scope.rollback().await,
            None => Ok(()),
        }
    }

    /// Commit now, whether or not the rows have been consumed
    pub async fn commit(mut self) -> Result<()> {
        self.end();
        self.buffer.clear();
        match self.scope.take() {
            Some(scope) => scope.commit().await,
            None => Ok(()),
        }
    }

    /// Adapt into a `Stream` that ends after the last row or the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<Row>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            match iter.next().await {
                Ok(Some(row)) => Some((Ok(row), Some(iter))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl fmt::Debug for RowIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowIter")
            .field("scope", &self.scope)
            .field("buffered", &self.buffer.len())
            .field("batch_size", &self.batch_size)
            .field("exhausted", &self.exhausted)
            .field("fetched", &self.fetched)
            .finish()
    }
}
