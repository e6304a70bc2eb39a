//! Cache backend access.
//!
//! # Data Flow
//! ```text
//! CacheClient::execute(ctx, cmd, args)
//!     → pool.rs (borrow bounded connection)
//!     → conn.rs (dial / command round-trip, timeouts)
//!     → resp.rs (wire framing)
//!     → span + structured log emitted under the call scope
//!     → connection returned on every exit path
//! ```

pub mod client;
pub mod conn;
pub mod resp;

use std::time::Duration;

use thiserror::Error;

pub use client::CacheClient;
pub use conn::CacheConn;
pub use resp::Reply;

/// Errors from cache backend operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// TCP connect or handshake (AUTH/SELECT) failed.
    #[error("dial failed: {0}")]
    Dial(String),

    /// Wire-level I/O failed mid-command.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read, write, or connect exceeded the configured deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The reply stream violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend answered with an error reply.
    #[error("backend error: {0}")]
    Backend(String),

    /// No connection could be borrowed from the pool.
    #[error(transparent)]
    Pool(#[from] crate::pool::PoolError),
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
