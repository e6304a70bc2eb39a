//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the databus
//! layer. All types derive Serde traits for deserialization from config files.
//! Configuration is immutable after load; one `CacheConfig`/`SearchConfig`
//! instance exists per logical connection name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DatabusConfig {
    /// Demo service listener settings.
    pub server: ServerConfig,

    /// Panic recovery boundary settings.
    pub recovery: RecoveryConfig,

    /// Cache backends, keyed by logical connection name.
    pub cache: HashMap<String, CacheConfig>,

    /// Search backends, keyed by logical connection name.
    pub search: HashMap<String, SearchConfig>,
}

/// Listener configuration for the demo service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// One cache backend endpoint plus its pool sizing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend host.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Password sent via AUTH at dial time; empty disables AUTH.
    pub auth: String,

    /// Logical database selected via SELECT at dial time.
    pub db: u32,

    /// Maximum connections (idle + borrowed) per pool.
    pub max_active: usize,

    /// Idle connections kept warm; excess is closed on return.
    pub max_idle: usize,

    /// Idle connections older than this are evicted.
    pub idle_timeout_secs: u64,

    /// Default wait deadline for a borrow when the pool is saturated.
    pub borrow_timeout_secs: u64,

    /// Connect/read/write timeout for the wire protocol.
    pub io_timeout_secs: u64,

    /// Emit an info-level log line for every successful command.
    pub is_log: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            auth: String::new(),
            db: 0,
            max_active: 20,
            max_idle: 10,
            idle_timeout_secs: 1,
            borrow_timeout_secs: 5,
            io_timeout_secs: 2,
            is_log: false,
        }
    }
}

impl CacheConfig {
    /// Backend address in host:port form.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One search backend endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Backend host, with or without an http:// prefix.
    pub host: String,

    /// Backend port.
    pub port: u16,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Emit an info-level log line for every successful query.
    pub is_log: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9200,
            timeout_secs: 10,
            is_log: false,
        }
    }
}

impl SearchConfig {
    /// Base URL of the backend (scheme included).
    pub fn base_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            format!("{}:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Panic recovery boundary settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Root directory for diagnostic records; one subdirectory per day.
    pub dir: String,

    /// Module label embedded in diagnostic file names and synthesized contexts.
    pub module: String,

    /// Product label carried in log records.
    pub product: String,

    /// Deployment environment label (dev/staging/prod).
    pub env: String,

    /// Query-string field checked first for an inbound request id.
    pub query_id_field: String,

    /// Header carrying the request id, read and written back.
    pub header_id: String,

    /// Header carrying the hop count, read and written back.
    pub header_hop: String,

    /// Upper bound (exclusive) for the random diagnostic-file suffix.
    pub suffix_area: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            dir: "./logs".to_string(),
            module: "databus".to_string(),
            product: "databus".to_string(),
            env: "dev".to_string(),
            query_id_field: "logid".to_string(),
            header_id: "x-request-id".to_string(),
            header_hop: "x-hop".to_string(),
            suffix_area: 16,
        }
    }
}
