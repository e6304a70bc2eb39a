//! Search backend access.
//!
//! # Data Flow
//! ```text
//! SearchClient::{term_query, query_string, bool_search, …}(ctx, …)
//!     → query.rs (build the JSON body)
//!     → client.rs (POST {host}/{index}/{typ}/_search)
//!     → decoded JSON; a top-level "error" field is a failure regardless
//!       of HTTP status
//!     → span + structured log emitted under the call scope
//! ```

pub mod client;
pub mod query;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub use client::SearchClient;
pub use query::{BoolQuery, Window};

/// Errors from search backend operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Connection, timeout, or HTTP-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response carried an embedded error payload. Classified as a
    /// failure even on HTTP 2xx.
    #[error("backend error: {0}")]
    Backend(String),

    /// The response decoded but did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The backend answered without acknowledging the operation.
    #[error("not acknowledged: {0}")]
    NotAcknowledged(String),
}

/// Result type for search operations.
pub type SearchOpResult<T> = Result<T, SearchError>;

/// Typed search response.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub hits: Hits,
}

/// Hit collection with the backend's total match count.
#[derive(Debug, Clone, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// One matched document.
#[derive(Debug, Clone, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}
