//! Search client behavior against a mock HTTP backend.

use std::net::SocketAddr;

use serde_json::json;

use databus::config::SearchConfig;
use databus::context::RequestContext;
use databus::search::{BoolQuery, SearchClient, SearchError, Window};

mod common;

fn ctx() -> RequestContext {
    let mut ctx = RequestContext::background("test");
    ctx.request_id = "test-req".into();
    ctx
}

fn client_for(addr: SocketAddr) -> SearchClient {
    let config = SearchConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        timeout_secs: 5,
        is_log: false,
    };
    SearchClient::new("main", config).unwrap()
}

fn hits_body() -> serde_json::Value {
    json!({
        "took": 3,
        "timed_out": false,
        "hits": {
            "total": 2,
            "max_score": 1.5,
            "hits": [
                {"_index": "users", "_id": "1", "_score": 1.5, "_source": {"uid": 42}},
                {"_index": "users", "_id": "2", "_score": 0.5, "_source": {"uid": 43}}
            ]
        }
    })
}

#[tokio::test]
async fn test_probe_reads_version() {
    let addr = common::start_mock_search(200, json!({})).await;
    let client = client_for(addr);
    assert_eq!(client.probe().await.unwrap(), "6.8.0");
}

#[tokio::test]
async fn test_term_query_typed_decode() {
    let addr = common::start_mock_search(200, hits_body()).await;
    let client = client_for(addr);

    let result = client
        .term_query(&ctx(), "users", "user", "uid", 42, Window::new(0, 10))
        .await
        .unwrap();
    assert_eq!(result.hits.total, 2);
    assert_eq!(result.hits.hits.len(), 2);
    assert_eq!(result.hits.hits[0].id, "1");
    assert_eq!(result.hits.hits[0].source["uid"], 42);
}

#[tokio::test]
async fn test_search_map_returns_raw_mapping() {
    let addr = common::start_mock_search(200, hits_body()).await;
    let client = client_for(addr);

    let body = json!({"from": 0, "size": 1, "query": {"match_all": {}}});
    let value = client
        .search_map(&ctx(), "users", "user", &body)
        .await
        .unwrap();
    assert_eq!(value["hits"]["total"], 2);
}

#[tokio::test]
async fn test_embedded_error_with_http_200_is_failure() {
    let error_body = json!({"error": {"type": "index_not_found_exception"}, "status": 404});
    let addr = common::start_mock_search(200, error_body).await;
    let client = client_for(addr);

    let q = BoolQuery::new(Window::new(0, 10)).text("hello", &["title"]);
    let result = client.bool_search(&ctx(), "missing", "doc", &q).await;
    assert!(matches!(result, Err(SearchError::Backend(_))));
}

#[tokio::test]
async fn test_http_500_classified_identically() {
    let error_body = json!({"error": {"type": "search_phase_execution_exception"}});
    let addr = common::start_mock_search(500, error_body).await;
    let client = client_for(addr);

    let q = BoolQuery::new(Window::new(0, 10)).text("hello", &["title"]);
    let result = client.bool_search(&ctx(), "users", "doc", &q).await;
    assert!(matches!(result, Err(SearchError::Backend(_))));
}

#[tokio::test]
async fn test_typed_queries_share_error_classification() {
    let error_body = json!({"error": {"type": "parsing_exception"}});
    let addr = common::start_mock_search(200, error_body).await;
    let client = client_for(addr);

    let result = client
        .query_string(&ctx(), "users", "user", "uid:42", Window::new(0, 10))
        .await;
    assert!(matches!(result, Err(SearchError::Backend(_))));

    let result = client
        .multi_match_best_fields(&ctx(), "users", "user", "bob", &["name"], Window::new(0, 10))
        .await;
    assert!(matches!(result, Err(SearchError::Backend(_))));
}
