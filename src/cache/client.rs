//! Instrumented cache executor.
//!
//! Wraps every command with the full call discipline: borrow a pooled
//! connection, run the command under a span, record latency and outcome,
//! emit the structured log line, and return the connection on every exit
//! path. Backend errors are returned to the caller wrapped with context and
//! are never retried here; retry policy belongs to the caller.

use std::time::Duration;

use tracing::Instrument;

use crate::cache::{CacheError, CacheResult, Reply};
use crate::config::CacheConfig;
use crate::context::{RequestContext, MODULE_CACHE};
use crate::exec::{statement, Instrumented};
use crate::pool::Pool;

/// Cache client for one logical connection name.
pub struct CacheClient {
    name: String,
    config: CacheConfig,
    pool: Pool,
}

impl CacheClient {
    /// Build the client and its pool. No connection is dialed yet; the
    /// registry probes reachability on first use.
    pub fn new(name: &str, config: CacheConfig) -> Self {
        Self {
            name: name.to_string(),
            pool: Pool::new(config.clone()),
            config,
        }
    }

    /// Logical connection name this client serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying pool (occupancy inspection).
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Reachability probe: borrow one connection and PING it.
    pub async fn probe(&self) -> CacheResult<()> {
        let mut conn = self.pool.borrow(self.borrow_timeout()).await?;
        conn.ping().await
    }

    /// Run one command with the configured borrow deadline.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        command: &str,
        args: &[&str],
    ) -> CacheResult<Reply> {
        self.execute_timeout(ctx, self.borrow_timeout(), command, args)
            .await
    }

    /// Run one command, waiting at most `wait` for a pool slot.
    ///
    /// `PING` is an infrastructure probe: it executes but bypasses span and
    /// log emission entirely.
    pub async fn execute_timeout(
        &self,
        ctx: &RequestContext,
        wait: Duration,
        command: &str,
        args: &[&str],
    ) -> CacheResult<Reply> {
        if command.eq_ignore_ascii_case("PING") {
            return self.run(wait, command, args).await;
        }

        let call = Instrumented::begin(
            ctx,
            MODULE_CACHE,
            "cache_execute",
            "cache",
            statement(command, args),
            self.config.is_log,
        );
        let result = self
            .run(wait, command, args)
            .instrument(call.span().clone())
            .await;
        call.finish(&result);
        result
    }

    async fn run(&self, wait: Duration, command: &str, args: &[&str]) -> CacheResult<Reply> {
        let mut conn = self.pool.borrow(wait).await?;
        let result = conn.command(command, args).await;
        match &result {
            // A backend error reply leaves the connection usable; wire
            // failures leave it in an unknown state.
            Ok(_) | Err(CacheError::Backend(_)) => {}
            Err(_) => conn.discard(),
        }
        result
    }

    fn borrow_timeout(&self) -> Duration {
        Duration::from_secs(self.config.borrow_timeout_secs)
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("name", &self.name)
            .field("backend", &self.config.address())
            .field("pool", &self.pool.stats())
            .finish()
    }
}
