//! Search client: typed and raw query execution plus index/document
//! management.
//!
//! All query flavors issue their own HTTP request and run under the same
//! span/log discipline as cache calls. A response whose decoded body carries
//! a top-level `error` field is treated as a failure even when the HTTP
//! status is 2xx; it surfaces as [`SearchError::Backend`] to the caller
//! rather than terminating anything.

use std::time::Duration;

use serde_json::Value;
use tracing::Instrument;

use crate::config::SearchConfig;
use crate::context::{RequestContext, MODULE_SEARCH};
use crate::exec::Instrumented;
use crate::search::query::{self, BoolQuery, Window};
use crate::search::{SearchError, SearchOpResult, SearchResult};

/// Search client for one logical connection name.
pub struct SearchClient {
    name: String,
    config: SearchConfig,
    base_url: String,
    http: reqwest::Client,
}

impl SearchClient {
    /// Build the client. No request is issued yet; the registry probes
    /// reachability on first use.
    pub fn new(name: &str, config: SearchConfig) -> SearchOpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            name: name.to_string(),
            base_url: config.base_url(),
            config,
            http,
        })
    }

    /// Logical connection name this client serves.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reachability probe: read the backend's root document and return the
    /// reported version.
    pub async fn probe(&self) -> SearchOpResult<String> {
        let body: Value = self.http.get(&self.base_url).send().await?.json().await?;
        let version = body
            .pointer("/version/number")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        tracing::info!(
            name = %self.name,
            backend = %self.base_url,
            version = %version,
            "search backend reachable"
        );
        Ok(version)
    }

    // ── Query execution ─────────────────────────────────────────────

    /// Typed flavor: decode the response into [`SearchResult`].
    pub async fn search(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        body: &Value,
    ) -> SearchOpResult<SearchResult> {
        let value = self.execute(ctx, "search", index, typ, body).await?;
        serde_json::from_value(value).map_err(|e| SearchError::Decode(e.to_string()))
    }

    /// Raw flavor: the decoded JSON mapping as-is.
    pub async fn search_map(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        body: &Value,
    ) -> SearchOpResult<Value> {
        self.execute(ctx, "search", index, typ, body).await
    }

    /// Single-field exact match.
    pub async fn term_query(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        field: &str,
        value: impl Into<Value>,
        window: Window,
    ) -> SearchOpResult<SearchResult> {
        let body = query::search_body(query::term(field, value), vec![], window);
        self.search(ctx, index, typ, &body).await
    }

    /// OR'd multi-field best-fields match, most relevant first.
    pub async fn multi_match_best_fields(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        text: &str,
        fields: &[&str],
        window: Window,
    ) -> SearchOpResult<SearchResult> {
        let body = query::search_body(
            query::multi_match(text, fields),
            vec![query::sort_desc("_score")],
            window,
        );
        self.search(ctx, index, typ, &body).await
    }

    /// Free-text query-string match.
    pub async fn query_string(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        text: &str,
        window: Window,
    ) -> SearchOpResult<SearchResult> {
        let body = query::search_body(query::query_string(text), vec![], window);
        self.search(ctx, index, typ, &body).await
    }

    /// Date-range filter sorted by the range field, newest first.
    pub async fn range_query(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        field: &str,
        gte: impl Into<Value>,
        window: Window,
    ) -> SearchOpResult<SearchResult> {
        let body = query::search_body(
            query::range_gte(field, gte),
            vec![query::sort_desc(field)],
            window,
        );
        self.search(ctx, index, typ, &body).await
    }

    /// Query-string match with randomized scoring (sampling).
    pub async fn random_query(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        text: &str,
        size: u64,
    ) -> SearchOpResult<SearchResult> {
        let body = query::search_body(
            query::random_score(query::query_string(text)),
            vec![],
            Window::new(0, size),
        );
        self.search(ctx, index, typ, &body).await
    }

    /// Assembled boolean query submitted as raw JSON.
    pub async fn bool_search(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        q: &BoolQuery,
    ) -> SearchOpResult<Value> {
        self.execute(ctx, "bool_search", index, typ, &q.body()).await
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        index: &str,
        typ: &str,
        body: &Value,
    ) -> SearchOpResult<Value> {
        let statement = format!(
            "uri:{}, index:{}, type:{}, query:{}",
            self.base_url, index, typ, body
        );
        let call = Instrumented::begin(
            ctx,
            MODULE_SEARCH,
            operation,
            "search",
            statement,
            self.config.is_log,
        );
        let url = format!("{}/{}/{}/_search", self.base_url, index, typ);
        let result = async {
            let value: Value = self.http.post(&url).json(body).send().await?.json().await?;
            classify(value)
        }
        .instrument(call.span().clone())
        .await;
        call.finish(&result);
        result
    }

    // ── Index and document management ───────────────────────────────

    /// Whether an index exists.
    pub async fn index_exists(&self, index: &str) -> SearchOpResult<bool> {
        let url = format!("{}/{}", self.base_url, index);
        let status = self.http.head(&url).send().await?.status();
        Ok(status.is_success())
    }

    /// Create an index with the given mapping. Creating an index that
    /// already exists is not an error.
    pub async fn create_index(
        &self,
        ctx: &RequestContext,
        index: &str,
        mapping: &Value,
    ) -> SearchOpResult<()> {
        if self.index_exists(index).await? {
            tracing::info!(request_id = %ctx.request_id, index, "index already exists");
            return Ok(());
        }
        let url = format!("{}/{}", self.base_url, index);
        let value: Value = self.http.put(&url).json(mapping).send().await?.json().await?;
        self.acknowledged(ctx, "create_index", index, value)
    }

    /// Delete an index.
    pub async fn delete_index(&self, ctx: &RequestContext, index: &str) -> SearchOpResult<()> {
        let url = format!("{}/{}", self.base_url, index);
        let value: Value = self.http.delete(&url).send().await?.json().await?;
        self.acknowledged(ctx, "delete_index", index, value)
    }

    /// Store one document under an explicit id.
    pub async fn put_doc(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        id: &str,
        doc: &Value,
    ) -> SearchOpResult<()> {
        let url = format!("{}/{}/{}/{}", self.base_url, index, typ, id);
        let value: Value = self.http.put(&url).json(doc).send().await?.json().await?;
        self.doc_result(ctx, "put_doc", index, id, value)
    }

    /// Delete one document.
    pub async fn delete_doc(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        id: &str,
    ) -> SearchOpResult<()> {
        let url = format!("{}/{}/{}/{}", self.base_url, index, typ, id);
        let value: Value = self.http.delete(&url).send().await?.json().await?;
        self.doc_result(ctx, "delete_doc", index, id, value)
    }

    /// Partially update one document.
    pub async fn update_doc(
        &self,
        ctx: &RequestContext,
        index: &str,
        typ: &str,
        id: &str,
        patch: &Value,
    ) -> SearchOpResult<()> {
        let url = format!("{}/{}/{}/{}/_update", self.base_url, index, typ, id);
        let mut body = serde_json::Map::new();
        body.insert("doc".into(), patch.clone());
        let value: Value = self
            .http
            .post(&url)
            .json(&Value::Object(body))
            .send()
            .await?
            .json()
            .await?;
        self.doc_result(ctx, "update_doc", index, id, value)
    }

    fn acknowledged(
        &self,
        ctx: &RequestContext,
        operation: &str,
        index: &str,
        value: Value,
    ) -> SearchOpResult<()> {
        let value = match classify(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(request_id = %ctx.request_id, operation, index, error = %e, "index operation failed");
                return Err(e);
            }
        };
        if value.get("acknowledged").and_then(Value::as_bool) != Some(true) {
            let err = SearchError::NotAcknowledged(format!("{} {}", operation, index));
            tracing::error!(request_id = %ctx.request_id, operation, index, "index operation not acknowledged");
            return Err(err);
        }
        tracing::info!(request_id = %ctx.request_id, operation, index, "index operation ok");
        Ok(())
    }

    fn doc_result(
        &self,
        ctx: &RequestContext,
        operation: &str,
        index: &str,
        id: &str,
        value: Value,
    ) -> SearchOpResult<()> {
        match classify(value) {
            Ok(_) => {
                if self.config.is_log {
                    tracing::info!(request_id = %ctx.request_id, operation, index, id, "document operation ok");
                }
                Ok(())
            }
            Err(e) => {
                tracing::error!(request_id = %ctx.request_id, operation, index, id, error = %e, "document operation failed");
                Err(e)
            }
        }
    }
}

/// A decoded body with a top-level `error` field is a failure, whatever the
/// HTTP status said.
fn classify(value: Value) -> SearchOpResult<Value> {
    match value.get("error") {
        Some(error) => Err(SearchError::Backend(error.to_string())),
        None => Ok(value),
    }
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("name", &self.name)
            .field("backend", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_embedded_error() {
        let err = classify(json!({"error": {"type": "index_not_found"}, "status": 200}));
        assert!(matches!(err, Err(SearchError::Backend(_))));
    }

    #[test]
    fn test_classify_clean_body() {
        assert!(classify(json!({"hits": {"total": 0, "hits": []}})).is_ok());
    }
}
