//! databus demo service.
//!
//! A small axum service that wires the full stack together:
//!
//! ```text
//!     Client Request
//!     ──────────────▶ recovery middleware (context synth, panic boundary)
//!                       → TraceLayer (per-request span)
//!                         → handler
//!                           → Registry (name → client, construct-once)
//!                             → CacheClient / SearchClient
//!                               → bounded pool / HTTP backend
//! ```
//!
//! Every backend call below the handler emits one child span and one log
//! line; any panic unwinds to the recovery middleware and becomes the fixed
//! 500 payload plus a diagnostic record on disk.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use databus::config::{load_config, DatabusConfig};
use databus::context::RequestContext;
use databus::recovery;
use databus::Registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "databus=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Panics must reach the recovery boundary with a usable backtrace.
    recovery::install_panic_hook();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(Path::new(&path))?,
        None => DatabusConfig::default(),
    };

    tracing::info!(
        bind_address = %config.server.bind_address,
        caches = config.cache.len(),
        searches = config.search.len(),
        "configuration loaded"
    );

    let registry = Arc::new(Registry::new(config.clone()));
    let recovery_config = Arc::new(config.recovery.clone());

    // Last layer added runs first: recovery is the outermost boundary.
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/cache/{name}/{key}", get(cache_get))
        .with_state(registry)
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(
            recovery_config,
            recovery::recover,
        ));

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "databus demo service listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

/// Fetch one key from a named cache backend.
async fn cache_get(
    State(registry): State<Arc<Registry>>,
    Extension(ctx): Extension<RequestContext>,
    UrlPath((name, key)): UrlPath<(String, String)>,
) -> impl IntoResponse {
    let client = match registry.cache(&name).await {
        Ok(client) => client,
        Err(e) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"errno": 1, "errmsg": e.to_string(), "data": {}})),
            )
                .into_response();
        }
    };

    match client.execute(&ctx, "GET", &[&key]).await {
        Ok(reply) => Json(json!({
            "errno": 0,
            "errmsg": "",
            "data": { "key": key, "value": reply.as_text() },
        }))
        .into_response(),
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"errno": 1, "errmsg": e.to_string(), "data": {}})),
        )
            .into_response(),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
