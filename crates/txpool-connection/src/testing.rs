//! Mock driver shared by the unit tests
//!
//! Statements understood by `MockCursor::execute`:
//!
//! - `sleep <ms>` - waits on the tokio clock, then succeeds
//! - `select ...` - loads the factory's rows (a single `n` column)
//! - `select broken` - like `select`, but the second batch fetch fails
//! - `fail` - returns a query error
//! - `disconnect` - closes the session and returns a connection error
//! - `disconnect quietly` - closes the session and succeeds
//! - `rowcount <n>` - reports no count from `execute` but `n` from `row_count`
//! - anything else succeeds with one affected row

use std::collections::VecDeque;
use std::sync::{Arc, Once};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use txpool_core::{Connection, Cursor, IsolationLevel, Result, Row, TxpoolError, Value};

use crate::pool::ConnectionFactory;
use crate::wait::WaitCallback;

/// Route pool logging to the test harness, filtered by `RUST_LOG`
pub(crate) fn init_logging() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Counters observed across every connection a factory created
#[derive(Default)]
pub(crate) struct Tally {
    created: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    closes: AtomicUsize,
    fetch_batches: AtomicUsize,
    isolation_sets: Mutex<Vec<(usize, IsolationLevel)>>,
    executed: Mutex<Vec<(usize, String)>>,
}

impl Tally {
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_open(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    pub(crate) fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_batches(&self) -> usize {
        self.fetch_batches.load(Ordering::SeqCst)
    }

    pub(crate) fn isolation_sets(&self) -> Vec<(usize, IsolationLevel)> {
        self.isolation_sets.lock().clone()
    }

    /// Connection ids in the order they executed a statement
    pub(crate) fn executed_by(&self) -> Vec<usize> {
        self.executed.lock().iter().map(|(id, _)| *id).collect()
    }
}

/// Factory producing `MockConnection`s that report into one `Tally`
pub(crate) struct MockFactory {
    tally: Arc<Tally>,
    rows: Arc<Vec<i64>>,
    failing_creates: AtomicUsize,
    fail_rollback: bool,
    fail_commit: bool,
    fail_isolation_to: Option<IsolationLevel>,
    isolation_delay: Option<Duration>,
    isolation: IsolationLevel,
    connect_delay: Option<Duration>,
}

impl MockFactory {
    pub(crate) fn new() -> Self {
        init_logging();
        Self {
            tally: Arc::new(Tally::default()),
            rows: Arc::new(Vec::new()),
            failing_creates: AtomicUsize::new(0),
            fail_rollback: false,
            fail_commit: false,
            fail_isolation_to: None,
            isolation_delay: None,
            isolation: IsolationLevel::ReadCommitted,
            connect_delay: None,
        }
    }

    pub(crate) fn with_rows(mut self, rows: Vec<i64>) -> Self {
        self.rows = Arc::new(rows);
        self
    }

    /// Make the next `count` connection attempts fail
    pub(crate) fn with_failing_creates(self, count: usize) -> Self {
        self.failing_creates.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn with_failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub(crate) fn with_failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Refuse every attempt to switch a connection to `level`
    pub(crate) fn with_failing_isolation_set(mut self, level: IsolationLevel) -> Self {
        self.fail_isolation_to = Some(level);
        self
    }

    /// Make isolation switches take effect, then stall for `delay`
    pub(crate) fn with_isolation_delay(mut self, delay: Duration) -> Self {
        self.isolation_delay = Some(delay);
        self
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub(crate) fn tally(&self) -> Arc<Tally> {
        self.tally.clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self, _waiter: Arc<dyn WaitCallback>) -> Result<Box<dyn Connection>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TxpoolError::Connection("connection refused".into()));
        }

        let id = self.tally.created.fetch_add(1, Ordering::SeqCst);
        let open = self.tally.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.peak_open.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(MockConnection {
            id,
            tally: self.tally.clone(),
            closed: Arc::new(AtomicBool::new(false)),
            isolation: self.isolation,
            fail_rollback: self.fail_rollback,
            fail_commit: self.fail_commit,
            fail_isolation_to: self.fail_isolation_to,
            isolation_delay: self.isolation_delay,
            rows: self.rows.clone(),
        }))
    }
}

pub(crate) struct MockConnection {
    id: usize,
    tally: Arc<Tally>,
    closed: Arc<AtomicBool>,
    isolation: IsolationLevel,
    fail_rollback: bool,
    fail_commit: bool,
    fail_isolation_to: Option<IsolationLevel>,
    isolation_delay: Option<Duration>,
    rows: Arc<Vec<i64>>,
}

impl MockConnection {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TxpoolError::Connection("connection already closed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    async fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        self.check_open()?;
        if self.fail_isolation_to == Some(level) {
            return Err(TxpoolError::Driver(format!("cannot switch to {}", level)));
        }
        self.tally.isolation_sets.lock().push((self.id, level));
        self.isolation = level;
        if let Some(delay) = self.isolation_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        if self.fail_commit {
            return Err(TxpoolError::Driver("commit refused".into()));
        }
        self.tally.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.check_open()?;
        self.tally.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.fail_rollback {
            return Err(TxpoolError::Driver("rollback refused".into()));
        }
        Ok(())
    }

    async fn cursor(&mut self) -> Result<Box<dyn Cursor>> {
        self.check_open()?;
        Ok(Box::new(MockCursor {
            conn_id: self.id,
            tally: self.tally.clone(),
            closed: self.closed.clone(),
            rows: self.rows.clone(),
            result: VecDeque::new(),
            fail_second_batch: false,
            batches: 0,
            row_count: None,
        }))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.tally.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("<mock connection {}>", self.id)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.tally.open.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) struct MockCursor {
    conn_id: usize,
    tally: Arc<Tally>,
    closed: Arc<AtomicBool>,
    rows: Arc<Vec<i64>>,
    result: VecDeque<Row>,
    fail_second_batch: bool,
    batches: usize,
    row_count: Option<u64>,
}

impl MockCursor {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TxpoolError::Connection("connection already closed".into()))
        } else {
            Ok(())
        }
    }

    fn load_rows(&mut self) -> u64 {
        let columns: Arc<[String]> = Arc::from(vec!["n".to_string()]);
        self.result = self
            .rows
            .iter()
            .map(|n| Row::new(columns.clone(), vec![Value::Int64(*n)]))
            .collect();
        self.batches = 0;
        self.result.len() as u64
    }
}

#[async_trait]
impl Cursor for MockCursor {
    async fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64> {
        self.check_open()?;
        self.tally
            .executed
            .lock()
            .push((self.conn_id, sql.to_string()));

        let affected = if let Some(ms) = sql.strip_prefix("sleep ") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| TxpoolError::Query(format!("bad sleep: {}", sql)))?;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            1
        } else if sql == "disconnect" {
            self.closed.store(true, Ordering::SeqCst);
            return Err(TxpoolError::Connection(
                "server closed the connection unexpectedly".into(),
            ));
        } else if let Some(n) = sql.strip_prefix("rowcount ") {
            let n: u64 = n
                .trim()
                .parse()
                .map_err(|_| TxpoolError::Query(format!("bad rowcount: {}", sql)))?;
            self.row_count = Some(n);
            return Ok(0);
        } else if sql == "disconnect quietly" {
            self.closed.store(true, Ordering::SeqCst);
            0
        } else if sql == "fail" {
            return Err(TxpoolError::Query("syntax error at or near \"fail\"".into()));
        } else if sql.starts_with("select") {
            self.fail_second_batch = sql == "select broken";
            self.load_rows()
        } else {
            1
        };

        self.row_count = Some(affected);
        Ok(affected)
    }

    async fn fetch_one(&mut self) -> Result<Option<Row>> {
        self.check_open()?;
        Ok(self.result.pop_front())
    }

    async fn fetch_all(&mut self) -> Result<Vec<Row>> {
        self.check_open()?;
        Ok(self.result.drain(..).collect())
    }

    async fn fetch_many(&mut self, size: usize) -> Result<Vec<Row>> {
        self.check_open()?;
        self.tally.fetch_batches.fetch_add(1, Ordering::SeqCst);
        self.batches += 1;
        if self.fail_second_batch && self.batches == 2 {
            return Err(TxpoolError::Query("cursor lost".into()));
        }
        let take = size.min(self.result.len());
        Ok(self.result.drain(..take).collect())
    }

    fn row_count(&self) -> Option<u64> {
        self.row_count
    }
}
