//! Connection pool implementation

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use txpool_core::{Connection, Result, TxpoolError};

use super::config::PoolConfig;
use super::lease::Lease;
use super::stats::PoolStats;
use crate::wait::WaitCallback;

/// Factory trait for creating new connections
///
/// The factory owns whatever parameters the driver needs and passes them
/// through untouched. It receives the pool's wait callback so that every
/// blocking operation of the new connection yields to the runtime.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Create a new connection
    async fn create(&self, waiter: Arc<dyn WaitCallback>) -> Result<Box<dyn Connection>>;
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self, waiter: Arc<dyn WaitCallback>) -> Result<Box<dyn Connection>> {
        (**self).create(waiter).await
    }
}

/// Adapts an async closure into a `ConnectionFactory`
///
/// ```ignore
/// let factory = FnFactory::new(move |waiter| {
///     let dsn = dsn.clone();
///     async move { MyDriver::connect(&dsn, waiter).await }
/// });
/// ```
pub struct FnFactory<F> {
    connect: F,
}

impl<F> FnFactory<F> {
    pub fn new(connect: F) -> Self {
        Self { connect }
    }
}

#[async_trait]
impl<F, Fut> ConnectionFactory for FnFactory<F>
where
    F: Fn(Arc<dyn WaitCallback>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Box<dyn Connection>>> + Send + 'static,
{
    async fn create(&self, waiter: Arc<dyn WaitCallback>) -> Result<Box<dyn Connection>> {
        (self.connect)(waiter).await
    }
}

/// What a parked `acquire` is woken with
pub(super) enum Grant {
    /// A connection coming back from another task
    Idle(Box<dyn Connection>),
    /// A freed slot the waiter may fill by creating a connection
    Slot,
}

struct PoolState {
    /// Live connections plus slots reserved for connections being created
    live: usize,
    idle: VecDeque<Box<dyn Connection>>,
    waiters: VecDeque<oneshot::Sender<Grant>>,
}

pub(super) struct Shared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    waiter: Arc<dyn WaitCallback>,
    state: Mutex<PoolState>,
    gets: AtomicU64,
    puts: AtomicU64,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    /// Hand a grant to the oldest waiter still listening, or park it
    ///
    /// Waiters whose `acquire` was cancelled are skipped; a connection nobody
    /// wants goes to the idle queue and an unwanted slot is given up.
    pub(super) fn dispatch(&self, mut grant: Grant) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(grant) {
                Ok(()) => return,
                Err(returned) => grant = returned,
            }
        }
        match grant {
            Grant::Idle(conn) => state.idle.push_back(conn),
            Grant::Slot => state.live = state.live.saturating_sub(1),
        }
    }

    pub(super) fn release(&self, conn: Box<dyn Connection>) {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Grant::Idle(conn));
    }

    /// Account for a connection the pool will never see again
    pub(super) fn retire(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        self.dispatch(Grant::Slot);
    }
}

/// A slot reserved for a connection that is being created
///
/// Dropped without `fill`, for example when the factory fails or the
/// acquiring task is cancelled, the slot is handed on.
struct SlotReservation<'a> {
    shared: &'a Arc<Shared>,
    filled: bool,
}

impl<'a> SlotReservation<'a> {
    fn new(shared: &'a Arc<Shared>) -> Self {
        Self {
            shared,
            filled: false,
        }
    }

    fn fill(mut self, conn: Box<dyn Connection>) -> Lease {
        self.filled = true;
        self.shared.created.fetch_add(1, Ordering::Relaxed);
        Lease::new(self.shared.clone(), conn)
    }
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        if !self.filled {
            self.shared.dispatch(Grant::Slot);
        }
    }
}

/// The receiving end of a parked `acquire`
///
/// If the acquiring task is cancelled after a grant was sent but before it
/// was taken, the grant is passed on instead of being lost.
struct PendingGrant<'a> {
    rx: oneshot::Receiver<Grant>,
    shared: &'a Shared,
}

impl Drop for PendingGrant<'_> {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(grant) = self.rx.try_recv() {
            self.shared.dispatch(grant);
        }
    }
}

/// A bounded pool of transactional connections
///
/// Cloning is cheap; all clones share one set of connections. The pool
/// creates connections lazily up to `max_size`, hands returned connections
/// out again in FIFO order, and parks callers in arrival order once every
/// connection is checked out.
#[derive(Clone)]
pub struct ConnectionPool {
    pub(super) shared: Arc<Shared>,
}

impl ConnectionPool {
    /// Create a pool that waits on driver sockets with the configured timeout
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let waiter = Arc::new(config.socket_waiter());
        Self::with_waiter(config, factory, waiter)
    }

    /// Create a pool with an explicit wait callback
    pub fn with_waiter<F: ConnectionFactory>(
        config: PoolConfig,
        factory: F,
        waiter: Arc<dyn WaitCallback>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                factory: Arc::new(factory),
                waiter,
                state: Mutex::new(PoolState {
                    live: 0,
                    idle: VecDeque::new(),
                    waiters: VecDeque::new(),
                }),
                gets: AtomicU64::new(0),
                puts: AtomicU64::new(0),
                created: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
        }
    }

    /// Get the pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// The wait callback handed to every connection this pool creates
    pub fn waiter(&self) -> &Arc<dyn WaitCallback> {
        &self.shared.waiter
    }

    /// Check out a connection
    ///
    /// Reuses the oldest idle connection if there is one, otherwise creates
    /// a new one while below `max_size`, otherwise waits until another task
    /// returns a connection or frees a slot. There is no acquire timeout;
    /// wrap the call in `tokio::time::timeout` to bound it.
    ///
    /// The caller owns the returned connection and must hand it back with
    /// `release` or `discard`.
    pub async fn acquire(&self) -> Result<Box<dyn Connection>> {
        self.lease().await.map(Lease::into_inner)
    }

    pub(crate) async fn lease(&self) -> Result<Lease> {
        self.shared.gets.fetch_add(1, Ordering::Relaxed);

        let rx = {
            let mut state = self.shared.state.lock();
            if let Some(conn) = state.idle.pop_front() {
                return Ok(Lease::new(self.shared.clone(), conn));
            }
            if state.live < self.shared.config.max_size() {
                state.live += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        let Some(rx) = rx else {
            return self.create(SlotReservation::new(&self.shared)).await;
        };

        tracing::debug!(
            max_size = self.shared.config.max_size(),
            "pool exhausted, waiting for a connection"
        );
        let mut pending = PendingGrant {
            rx,
            shared: &self.shared,
        };
        match (&mut pending.rx).await {
            Ok(Grant::Idle(conn)) => Ok(Lease::new(self.shared.clone(), conn)),
            Ok(Grant::Slot) => self.create(SlotReservation::new(&self.shared)).await,
            Err(_) => Err(TxpoolError::Connection(
                "pool stopped while waiting for a connection".into(),
            )),
        }
    }

    async fn create(&self, slot: SlotReservation<'_>) -> Result<Lease> {
        match self.shared.factory.create(self.shared.waiter.clone()).await {
            Ok(conn) => {
                tracing::debug!(driver = conn.driver_name(), "created pooled connection");
                Ok(slot.fill(conn))
            }
            Err(e) => {
                tracing::warn!(error = %e, "connection factory failed");
                Err(TxpoolError::creation(e))
            }
        }
    }

    /// Return a connection to the idle queue
    ///
    /// The connection goes straight to the oldest waiting task if there is
    /// one. No liveness check is made here; callers must not release a
    /// connection they found closed.
    pub fn release(&self, conn: Box<dyn Connection>) {
        tracing::trace!(connection = %conn.describe(), "releasing connection");
        self.shared.release(conn);
    }

    /// Close a connection that must not be reused and free its slot
    ///
    /// Close errors are ignored; the slot is freed even if the returned
    /// future is dropped before completing.
    pub fn discard(&self, conn: Box<dyn Connection>) -> impl Future<Output = ()> + Send + use<> {
        Lease::new(self.shared.clone(), conn).discard()
    }

    /// Close every idle connection, ignoring close errors
    ///
    /// Checked-out connections are not touched and may later be released
    /// into the drained pool. Each closed connection frees its slot, so
    /// waiting tasks may create replacements. Returns how many connections
    /// were closed.
    pub async fn drain_and_close_all(&self) -> usize {
        let drained: Vec<Lease> = {
            let mut state = self.shared.state.lock();
            state
                .idle
                .drain(..)
                .map(|conn| Lease::new(self.shared.clone(), conn))
                .collect()
        };

        let count = drained.len();
        for lease in drained {
            lease.discard().await;
        }
        if count > 0 {
            tracing::debug!(closed = count, "drained idle connections");
        }
        count
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            max_size: self.shared.config.max_size(),
            live: state.live,
            idle: state.idle.len(),
            waiting: state.waiters.iter().filter(|w| !w.is_closed()).count(),
            gets: self.shared.gets.load(Ordering::Relaxed),
            puts: self.shared.puts.load(Ordering::Relaxed),
            created: self.shared.created.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.shared.config)
            .field("waiter", &self.shared.waiter)
            .field("stats", &self.stats())
            .finish()
    }
}
