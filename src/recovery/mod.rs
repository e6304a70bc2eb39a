//! Panic recovery boundary.
//!
//! # Responsibilities
//! - Establish or propagate the request context for every inbound request
//!   (request id: query param → header → fresh uuid; hop advanced by one)
//! - Buffer and restore the request body so downstream inspection is
//!   non-destructive
//! - Catch any panic escaping the handler chain, exactly once
//! - Persist a diagnostic record (headers, bodies, error, numbered stack
//!   trace) and answer with the fixed generic 500 payload
//! - Write the id and hop headers back onto every response
//!
//! Application errors are NOT handled here: every layer below returns
//! explicit `Result`s. Only genuinely unexpected faults unwind this far.

pub mod report;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt;
use serde::Serialize;

use crate::codes;
use crate::config::RecoveryConfig;
use crate::context::{Hop, RequestContext};
use report::DiagnosticRecord;

/// Largest request body the boundary will buffer for diagnostics.
const BODY_LIMIT: usize = 1024 * 1024;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the process-wide panic hook that stashes the backtrace captured
/// at the panic site. Call once at startup, before serving.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let backtrace = std::backtrace::Backtrace::force_capture();
        let trace = format!("panicked at {}\n{}", location, backtrace);
        LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
    }));
}

fn take_backtrace() -> String {
    LAST_BACKTRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| "stack trace unavailable (panic hook not installed)".to_string())
}

/// The fixed failure payload. Internal error detail never appears here.
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub errno: u32,
    pub errmsg: &'static str,
    pub data: serde_json::Map<String, serde_json::Value>,
    pub user_msg: &'static str,
}

/// The payload returned for any uncaught fault.
pub fn failure_body() -> FailureBody {
    FailureBody {
        errno: codes::SERVER_ERROR,
        errmsg: codes::errmsg(codes::SERVER_ERROR),
        data: serde_json::Map::new(),
        user_msg: codes::user_msg(codes::SERVER_ERROR),
    }
}

/// The recovery middleware. Layer it outermost so nothing unwinds past it.
pub async fn recover(
    State(config): State<Arc<RecoveryConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let uri_query = report::parse_query(parts.uri.query().unwrap_or(""));
    let ctx = synthesize_context(&config, &parts, &uri_query);
    let request_headers = snapshot_headers(&parts.headers);

    // Buffer the body so a fault record can include it and downstream
    // handlers still see every byte.
    let body_bytes = to_bytes(body, BODY_LIMIT).await.unwrap_or_default();

    let mut request = Request::from_parts(parts, Body::from(body_bytes.clone()));
    request.extensions_mut().insert(ctx.clone());

    let outcome = AssertUnwindSafe(next.run(request)).catch_unwind().await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(payload) => {
            let error_text = panic_message(payload.as_ref());
            let trace = take_backtrace();
            respond_to_fault(
                &config,
                &ctx,
                request_headers,
                &body_bytes,
                &uri_query,
                error_text,
                trace,
            )
        }
    };

    write_trace_headers(&config, &ctx, response.headers_mut());
    response
}

/// Build a context from raw request data.
///
/// Used for every request, whether or not an upstream service supplied
/// trace identifiers.
fn synthesize_context(
    config: &RecoveryConfig,
    parts: &Parts,
    uri_query: &BTreeMap<String, String>,
) -> RequestContext {
    let request_id = uri_query
        .get(&config.query_id_field)
        .filter(|id| !id.is_empty())
        .cloned()
        .or_else(|| header_value(&parts.headers, &config.header_id))
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let hop = Hop::next_from_header(header_value(&parts.headers, &config.header_hop).as_deref());

    RequestContext {
        request_id,
        hop,
        caller_ip: caller_ip(parts),
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        module: config.module.clone(),
        product: config.product.clone(),
        env: config.env.clone(),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Caller address: forwarded headers first, then the socket peer.
fn caller_ip(parts: &Parts) -> String {
    if let Some(forwarded) = header_value(&parts.headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = header_value(&parts.headers, "x-real-ip") {
        return real_ip;
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or("<binary>").to_string(),
            )
        })
        .collect()
}

fn respond_to_fault(
    config: &RecoveryConfig,
    ctx: &RequestContext,
    request_headers: BTreeMap<String, String>,
    request_body: &[u8],
    uri_query: &BTreeMap<String, String>,
    error_text: String,
    trace: String,
) -> Response {
    let body = failure_body();
    let response_bytes = serde_json::to_vec(&body).unwrap_or_else(|_| b"{}".to_vec());

    let record = DiagnosticRecord {
        request_id: ctx.request_id.clone(),
        hop: ctx.hop.to_string(),
        method: ctx.method.clone(),
        uri: ctx.uri.clone(),
        caller_ip: ctx.caller_ip.clone(),
        request_headers,
        uri_query: uri_query.clone(),
        request_body: report::decode_body(request_body),
        response_body: report::decode_body(&response_bytes),
        error: error_text.clone(),
        trace: report::trace_lines(&trace),
    };

    match report::write_record(config, &record) {
        Ok(path) => {
            tracing::error!(
                request_id = %ctx.request_id,
                uri = %ctx.uri,
                error = %error_text,
                record = %path.display(),
                "request panicked"
            );
        }
        Err(write_err) => {
            tracing::error!(
                request_id = %ctx.request_id,
                uri = %ctx.uri,
                error = %error_text,
                record_error = %write_err,
                "request panicked; diagnostic record could not be written"
            );
        }
    }

    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(response_bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn write_trace_headers(config: &RecoveryConfig, ctx: &RequestContext, headers: &mut HeaderMap) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(config.header_id.as_str()),
        HeaderValue::try_from(ctx.request_id.as_str()),
    ) {
        headers.insert(name, value);
    }
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(config.header_hop.as_str()),
        HeaderValue::try_from(ctx.hop.to_string()),
    ) {
        headers.insert(name, value);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts_for(uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = HttpRequest::builder().method("GET").uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn config() -> RecoveryConfig {
        RecoveryConfig::default()
    }

    #[test]
    fn test_failure_body_shape() {
        let value = serde_json::to_value(failure_body()).unwrap();
        assert_eq!(value["errno"], codes::SERVER_ERROR);
        assert_eq!(value["data"], serde_json::json!({}));
        assert!(value["user_msg"].as_str().is_some());
        assert!(value.get("trace").is_none());
    }

    #[test]
    fn test_request_id_prefers_query_param() {
        let parts = parts_for("/x?logid=from-query", &[("x-request-id", "from-header")]);
        let query = report::parse_query(parts.uri.query().unwrap_or(""));
        let ctx = synthesize_context(&config(), &parts, &query);
        assert_eq!(ctx.request_id, "from-query");
    }

    #[test]
    fn test_request_id_falls_back_to_header_then_fresh() {
        let parts = parts_for("/x", &[("x-request-id", "from-header")]);
        let ctx = synthesize_context(&config(), &parts, &BTreeMap::new());
        assert_eq!(ctx.request_id, "from-header");

        let parts = parts_for("/x", &[]);
        let ctx = synthesize_context(&config(), &parts, &BTreeMap::new());
        assert_eq!(ctx.request_id.len(), 32); // uuid v4, simple format
    }

    #[test]
    fn test_hop_advances_from_header() {
        let parts = parts_for("/x", &[("x-hop", "2")]);
        let ctx = synthesize_context(&config(), &parts, &BTreeMap::new());
        assert_eq!(ctx.hop, Hop::Count(3));

        let parts = parts_for("/x", &[("x-hop", "null")]);
        let ctx = synthesize_context(&config(), &parts, &BTreeMap::new());
        assert_eq!(ctx.hop, Hop::Count(1));
    }

    #[test]
    fn test_caller_ip_precedence() {
        let parts = parts_for("/x", &[("x-forwarded-for", "1.2.3.4, 5.6.7.8")]);
        assert_eq!(caller_ip(&parts), "1.2.3.4");

        let parts = parts_for("/x", &[("x-real-ip", "9.9.9.9")]);
        assert_eq!(caller_ip(&parts), "9.9.9.9");

        let parts = parts_for("/x", &[]);
        assert_eq!(caller_ip(&parts), "unknown");
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("heap boom"));
        assert_eq!(panic_message(payload.as_ref()), "heap boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(17u32);
        assert!(panic_message(payload.as_ref()).contains("non-string"));
    }
}
