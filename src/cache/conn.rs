//! One physical cache connection.
//!
//! # Responsibilities
//! - Dial the backend with a connect timeout
//! - Authenticate and select the logical database at dial time
//! - Run command round-trips with read/write deadlines
//! - Provide the PING liveness probe used by the pool
//!
//! A connection is exclusively owned by one borrower at a time; the pool
//! enforces this via borrow/return, not via shared mutable state.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::cache::resp::{self, Reply};
use crate::cache::{CacheError, CacheResult};
use crate::config::CacheConfig;

/// A live connection to one cache backend endpoint.
#[derive(Debug)]
pub struct CacheConn {
    stream: BufStream<TcpStream>,
    io_timeout: Duration,
}

impl CacheConn {
    /// Dial the backend described by `config`.
    ///
    /// AUTH and SELECT run inside the same deadline as the connect itself,
    /// so a wedged backend cannot stall startup.
    pub async fn dial(config: &CacheConfig) -> CacheResult<Self> {
        let io_timeout = Duration::from_secs(config.io_timeout_secs);
        let address = config.address();

        let stream = timeout(io_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| CacheError::Timeout(io_timeout))?
            .map_err(|e| CacheError::Dial(format!("{}: {}", address, e)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| CacheError::Dial(format!("{}: {}", address, e)))?;

        let mut conn = Self {
            stream: BufStream::new(stream),
            io_timeout,
        };

        if !config.auth.is_empty() {
            conn.command("AUTH", &[&config.auth]).await?;
        }
        if config.db != 0 {
            conn.command("SELECT", &[&config.db.to_string()]).await?;
        }

        Ok(conn)
    }

    /// Run one command round-trip.
    ///
    /// A `-ERR` reply surfaces as [`CacheError::Backend`]; every other frame
    /// is returned to the caller as-is.
    pub async fn command(&mut self, command: &str, args: &[&str]) -> CacheResult<Reply> {
        let payload = resp::encode_command(command, args);

        timeout(self.io_timeout, async {
            self.stream.write_all(&payload).await?;
            self.stream.flush().await
        })
        .await
        .map_err(|_| CacheError::Timeout(self.io_timeout))??;

        let reply = timeout(self.io_timeout, resp::read_reply(&mut self.stream))
            .await
            .map_err(|_| CacheError::Timeout(self.io_timeout))??;

        match reply {
            Reply::Error(message) => Err(CacheError::Backend(message)),
            reply => Ok(reply),
        }
    }

    /// Liveness probe: PING must answer PONG.
    pub async fn ping(&mut self) -> CacheResult<()> {
        match self.command("PING", &[]).await? {
            Reply::Simple(s) if s == "PONG" => Ok(()),
            other => Err(CacheError::Protocol(format!(
                "unexpected PING reply: {:?}",
                other
            ))),
        }
    }
}
