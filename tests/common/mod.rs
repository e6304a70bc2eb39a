//! Shared utilities for integration testing.
//!
//! Each test crate pulls in only the mocks it needs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Handle to a mock cache backend.
pub struct MockCache {
    pub addr: SocketAddr,
    /// Physical connections accepted so far.
    pub connections: Arc<AtomicUsize>,
}

impl MockCache {
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Start a minimal cache backend speaking the wire protocol.
///
/// Supported commands: PING (+PONG), SET (stores), GET (bulk or nil),
/// SLEEP <ms> (stalls, then +OK; lets tests hold pool slots), FAIL
/// (an error reply). Anything else answers +OK.
pub async fn start_mock_cache() -> MockCache {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let store: Arc<tokio::sync::Mutex<HashMap<String, String>>> = Arc::default();

    let conn_counter = Arc::clone(&connections);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            conn_counter.fetch_add(1, Ordering::SeqCst);
            let store = Arc::clone(&store);
            tokio::spawn(serve_cache_conn(socket, store));
        }
    });

    MockCache { addr, connections }
}

async fn serve_cache_conn(
    socket: TcpStream,
    store: Arc<tokio::sync::Mutex<HashMap<String, String>>>,
) {
    let mut reader = BufReader::new(socket);
    while let Some(parts) = read_command(&mut reader).await {
        let reply = match parts[0].to_ascii_uppercase().as_str() {
            "PING" => "+PONG\r\n".to_string(),
            "SET" if parts.len() >= 3 => {
                store
                    .lock()
                    .await
                    .insert(parts[1].clone(), parts[2].clone());
                "+OK\r\n".to_string()
            }
            "GET" if parts.len() >= 2 => match store.lock().await.get(&parts[1]) {
                Some(value) => format!("${}\r\n{}\r\n", value.len(), value),
                None => "$-1\r\n".to_string(),
            },
            "SLEEP" if parts.len() >= 2 => {
                let ms = parts[1].parse::<u64>().unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                "+OK\r\n".to_string()
            }
            "FAIL" => "-ERR forced failure\r\n".to_string(),
            _ => "+OK\r\n".to_string(),
        };
        if reader.get_mut().write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Read one inbound command (array of bulk strings). None on EOF.
async fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<String>> {
    let header = read_line(reader).await?;
    let count = header.strip_prefix('*')?.parse::<usize>().ok()?;
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        let len_line = read_line(reader).await?;
        let len = len_line.strip_prefix('$')?.parse::<usize>().ok()?;
        let mut payload = vec![0u8; len + 2];
        reader.read_exact(&mut payload).await.ok()?;
        payload.truncate(len);
        parts.push(String::from_utf8(payload).ok()?);
    }
    Some(parts)
}

async fn read_line(reader: &mut BufReader<TcpStream>) -> Option<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await.ok()?;
    if n == 0 {
        return None;
    }
    Some(line.trim_end().to_string())
}

/// Start a mock search backend.
///
/// `GET /` answers a version document (reachability probe); anything else
/// answers `status` + `body`.
pub async fn start_mock_search(status: u16, body: serde_json::Value) -> SocketAddr {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Json, Router};

    let status = StatusCode::from_u16(status).unwrap();
    let app = Router::new().fallback(
        move |method: axum::http::Method, uri: axum::http::Uri| {
            let body = body.clone();
            async move {
                if method == axum::http::Method::GET && uri.path() == "/" {
                    return Json(serde_json::json!({
                        "name": "mock",
                        "version": { "number": "6.8.0" },
                    }))
                    .into_response();
                }
                (status, Json(body)).into_response()
            }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
