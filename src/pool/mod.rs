//! Bounded connection pool for one cache backend endpoint.
//!
//! # Responsibilities
//! - Bound borrowed connections to `max_active` via semaphore permits
//! - Block borrowers (up to a wait deadline) instead of failing fast
//! - Health-check idle connections before handing them out
//! - Return connections on every exit path via a drop guard
//! - Evict idle connections past `max_idle` / `idle_timeout`
//!
//! A borrowed connection is exclusively owned by the borrowing call until the
//! guard drops. The guard returns the connection during unwinding too, so a
//! panicking caller cannot leak a pool slot.

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::cache::{CacheConn, CacheResult};
use crate::config::CacheConfig;

/// Errors raised by the pool itself (dial errors surface as cache errors).
#[derive(Debug, Error)]
pub enum PoolError {
    /// All permits stayed busy for the whole wait deadline.
    #[error("pool exhausted: no connection available within {0:?}")]
    Exhausted(Duration),

    /// The pool was torn down while a borrower waited.
    #[error("pool closed")]
    Closed,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently borrowed.
    pub borrowed: usize,
    /// Connections sitting idle in the pool.
    pub idle: usize,
}

struct IdleConn {
    conn: CacheConn,
    since: Instant,
}

struct Shared {
    config: CacheConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConn>>,
}

/// Bounded pool of connections to one backend endpoint. Cheap to clone.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    /// Create a pool and spawn its idle reaper task.
    pub fn new(config: CacheConfig) -> Self {
        let shared = Arc::new(Shared {
            permits: Arc::new(Semaphore::new(config.max_active)),
            idle: Mutex::new(Vec::with_capacity(config.max_idle)),
            config,
        });
        spawn_reaper(Arc::downgrade(&shared));
        Self { shared }
    }

    /// Borrow a connection, waiting up to `wait` for a free slot.
    ///
    /// Idle connections are PINGed before reuse; stale or unhealthy ones are
    /// closed and the next candidate (or a fresh dial) is tried.
    pub async fn borrow(&self, wait: Duration) -> CacheResult<PooledConn> {
        let permit = match timeout(wait, self.shared.permits.clone().acquire_owned()).await {
            Err(_) => return Err(PoolError::Exhausted(wait).into()),
            Ok(Err(_)) => return Err(PoolError::Closed.into()),
            Ok(Ok(permit)) => permit,
        };

        let idle_timeout = Duration::from_secs(self.shared.config.idle_timeout_secs);
        loop {
            let candidate = self.shared.idle.lock().expect("pool idle lock").pop();
            let Some(entry) = candidate else { break };
            if entry.since.elapsed() > idle_timeout {
                continue;
            }
            let mut conn = entry.conn;
            if conn.ping().await.is_ok() {
                return Ok(PooledConn {
                    conn: Some(conn),
                    shared: Arc::clone(&self.shared),
                    _permit: permit,
                });
            }
            tracing::debug!(
                backend = %self.shared.config.address(),
                "discarding unhealthy idle connection"
            );
        }

        let conn = CacheConn::dial(&self.shared.config).await?;
        Ok(PooledConn {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Connections currently borrowed.
    pub fn active(&self) -> usize {
        self.shared.config.max_active - self.shared.permits.available_permits()
    }

    /// Current occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            borrowed: self.active(),
            idle: self.shared.idle.lock().expect("pool idle lock").len(),
        }
    }

    /// Drop idle connections older than the idle deadline. Returns the
    /// number evicted.
    pub fn reap_idle(&self) -> usize {
        self.shared.reap_idle()
    }
}

impl Shared {
    fn reap_idle(&self) -> usize {
        let deadline = Duration::from_secs(self.config.idle_timeout_secs);
        let mut idle = self.idle.lock().expect("pool idle lock");
        let before = idle.len();
        idle.retain(|entry| entry.since.elapsed() <= deadline);
        before - idle.len()
    }
}

fn spawn_reaper(shared: Weak<Shared>) {
    tokio::spawn(async move {
        loop {
            let period = match shared.upgrade() {
                Some(shared) => Duration::from_secs(shared.config.idle_timeout_secs.max(1)),
                None => return,
            };
            tokio::time::sleep(period).await;
            let Some(shared) = shared.upgrade() else { return };
            let evicted = shared.reap_idle();
            if evicted > 0 {
                tracing::debug!(
                    backend = %shared.config.address(),
                    evicted,
                    "evicted idle connections"
                );
            }
        }
    });
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("Pool")
            .field("backend", &self.shared.config.address())
            .field("max_active", &self.shared.config.max_active)
            .field("borrowed", &stats.borrowed)
            .field("idle", &stats.idle)
            .finish()
    }
}

/// Guard around a borrowed connection.
///
/// Dropping the guard returns the connection to the idle list (or closes it
/// when the idle list is full); the permit is released afterwards. This runs
/// during panics as well, so a slot can never leak.
pub struct PooledConn {
    conn: Option<CacheConn>,
    shared: Arc<Shared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConn {
    /// Close the connection instead of returning it (e.g. after a wire
    /// error left it in an unknown state).
    pub fn discard(mut self) {
        self.conn = None;
    }
}

impl std::ops::Deref for PooledConn {
    type Target = CacheConn;

    fn deref(&self) -> &CacheConn {
        self.conn.as_ref().expect("connection already discarded")
    }
}

impl std::ops::DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut CacheConn {
        self.conn.as_mut().expect("connection already discarded")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let mut idle = self.shared.idle.lock().expect("pool idle lock");
            if idle.len() < self.shared.config.max_idle {
                idle.push(IdleConn {
                    conn,
                    since: Instant::now(),
                });
            }
        }
    }
}
