// 🔌 Connection Pool - bounded, thread-safe checkout of SQLite connections
//
// Idle connections wait in a bounded channel; an atomic counter caps how many
// connections are alive at once. A checked-out connection goes back to the
// pool when its guard is dropped, on every exit path. Every query run through
// a session carries a deadline enforced by SQLite's progress handler.

use crate::config::ResolverConfig;
use crate::error::{StoreError, StoreResult};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rusqlite::{Connection, OpenFlags};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

// ============================================================================
// CONNECTION FACTORIES
// ============================================================================

/// Supplies fresh connections to the pool.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn connect(&self) -> rusqlite::Result<Connection>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// Opens a database file in WAL mode.
#[derive(Debug, Clone)]
pub struct FileFactory {
    path: PathBuf,
}

impl FileFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileFactory { path: path.into() }
    }
}

impl ConnectionFactory for FileFactory {
    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        // Enable WAL mode so readers never block the importer
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        Ok(conn)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Named in-memory database shared by every connection of one factory.
///
/// The database lives as long as at least one connection is open. The pool
/// replaces a discarded connection before closing it whenever it would fall
/// below its minimum size, so the database survives broken connections.
#[derive(Debug, Clone)]
pub struct MemoryFactory {
    uri: String,
}

impl MemoryFactory {
    pub fn new() -> Self {
        MemoryFactory {
            uri: format!("file:attr-{}?mode=memory&cache=shared", uuid::Uuid::new_v4()),
        }
    }
}

impl Default for MemoryFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionFactory for MemoryFactory {
    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            &self.uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_SHARED_CACHE,
        )
    }

    fn describe(&self) -> String {
        self.uri.clone()
    }
}

// ============================================================================
// POOL
// ============================================================================

/// Longest single sleep of a waiting checkout before it re-checks capacity.
const CHECKOUT_POLL: Duration = Duration::from_millis(25);

/// VM instructions between two deadline checks of a running query.
const PROGRESS_OPS: i32 = 1_000;

struct PoolInner {
    factory: Box<dyn ConnectionFactory>,
    idle_tx: Sender<Connection>,
    idle_rx: Receiver<Connection>,
    live: AtomicUsize,
    min_size: usize,
    max_size: usize,
    checkout_timeout: Duration,
    query_timeout: Duration,
}

impl PoolInner {
    fn release(&self, conn: Connection) {
        if self.idle_tx.try_send(conn).is_err() {
            // Channel capacity equals max_size, so this only happens if the
            // live count drifted; drop the connection rather than block.
            warn!("Idle queue full, dropping connection");
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn forget(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    /// Close a broken connection, opening its replacement first when the
    /// pool would otherwise drop below `min_size`.
    fn discard(&self, conn: Connection) {
        if self.live.load(Ordering::Acquire) <= self.min_size {
            match self.open_connection() {
                Ok(fresh) => {
                    drop(conn);
                    self.release(fresh);
                    debug!("Replaced broken connection");
                    return;
                }
                Err(e) => warn!("Cannot replace broken connection: {}", e),
            }
        }
        drop(conn);
        self.forget();
    }

    /// Reserve a slot below `max_size`; false when the pool is at capacity.
    fn try_reserve(&self) -> bool {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_size).then_some(n + 1)
            })
            .is_ok()
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let conn = self.factory.connect().map_err(|e| StoreError::Connection {
            message: format!("{}: {}", self.factory.describe(), e),
        })?;
        conn.busy_timeout(self.query_timeout)
            .map_err(|e| StoreError::Connection { message: e.to_string() })?;
        Ok(conn)
    }
}

/// ConnectionPool - shared by every resolution in the process
///
/// Cloning is cheap; all clones share the same connections.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Build a pool and eagerly open `min_pool_size` connections.
    pub fn new(factory: impl ConnectionFactory, config: &ResolverConfig) -> StoreResult<Self> {
        config.validate().map_err(|e| StoreError::Connection { message: e.to_string() })?;

        let (idle_tx, idle_rx) = bounded(config.max_pool_size);
        let pool = ConnectionPool {
            inner: Arc::new(PoolInner {
                factory: Box::new(factory),
                idle_tx,
                idle_rx,
                live: AtomicUsize::new(0),
                min_size: config.min_pool_size,
                max_size: config.max_pool_size,
                checkout_timeout: config.checkout_timeout(),
                query_timeout: config.query_timeout(),
            }),
        };

        for _ in 0..config.min_pool_size {
            let conn = pool.inner.open_connection().map_err(|e| {
                error!("Cannot open connection: {}", e);
                e
            })?;
            pool.inner.live.fetch_add(1, Ordering::AcqRel);
            pool.inner.release(conn);
        }

        debug!(
            db = %pool.inner.factory.describe(),
            min = config.min_pool_size,
            max = config.max_pool_size,
            "Connection pool ready"
        );
        Ok(pool)
    }

    /// Check out a connection: idle first, then a new one if below the
    /// ceiling, otherwise wait up to the checkout timeout.
    ///
    /// A waiter wakes at least every [`CHECKOUT_POLL`] to pick up capacity
    /// freed by a discarded connection, which never reaches the idle queue.
    pub fn checkout(&self) -> StoreResult<PooledConnection> {
        let inner = &self.inner;
        let deadline = Instant::now() + inner.checkout_timeout;

        loop {
            if let Ok(conn) = inner.idle_rx.try_recv() {
                return Ok(self.guard(conn));
            }

            if inner.try_reserve() {
                return match inner.open_connection() {
                    Ok(conn) => Ok(self.guard(conn)),
                    Err(e) => {
                        inner.forget();
                        error!("Cannot open connection: {}", e);
                        Err(e)
                    }
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let err = StoreError::Connection {
                    message: format!(
                        "no connection available within {}ms ({} in use)",
                        inner.checkout_timeout.as_millis(),
                        inner.max_size
                    ),
                };
                error!("Cannot open connection: {}", err);
                return Err(err);
            }

            match inner.idle_rx.recv_timeout(remaining.min(CHECKOUT_POLL)) {
                Ok(conn) => return Ok(self.guard(conn)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StoreError::Connection {
                        message: "connection pool shut down".to_string(),
                    })
                }
            }
        }
    }

    fn guard(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            broken: false,
        }
    }

    /// Connections currently alive (idle + checked out).
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub fn idle(&self) -> usize {
        self.inner.idle_rx.len()
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }
}

// ============================================================================
// POOLED CONNECTION GUARD
// ============================================================================

/// A checked-out connection; returned to the pool on drop unless broken.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    broken: bool,
}

impl PooledConnection {
    /// Discard this connection instead of returning it to the pool.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Interrupt any statement still running once the query timeout has
    /// elapsed from now. The interrupted statement fails with
    /// `SQLITE_INTERRUPT`, which maps to [`StoreError::Unavailable`].
    pub fn arm_query_deadline(&self) {
        let deadline = Instant::now() + self.pool.query_timeout;
        self.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
    }

    pub fn disarm_query_deadline(&self) {
        self.progress_handler(0, None::<fn() -> bool>);
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken in drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken in drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.progress_handler(0, None::<fn() -> bool>);
            if self.broken {
                self.pool.discard(conn);
            } else {
                self.pool.release(conn);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
