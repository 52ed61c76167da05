//! Log query server
//!
//! Read-only HTTP access to the sink's recent lines, with an explicit flush
//! endpoint for durability points.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::logging::{read_tail, LogSink, SinkStats};

/// Lines returned when the query doesn't say
pub const DEFAULT_QUERY_LINES: usize = 100;

/// Handle to control the running server
pub struct ServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    addr: SocketAddr,
}

impl ServerHandle {
    /// Get the address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shutdown the server gracefully
    pub fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            // Ignore error if receiver is already dropped
            let _ = tx.send(());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<usize>,
}

/// Build the query routes
pub fn router(sink: Arc<LogSink>) -> Router {
    Router::new()
        .route("/logs", get(logs_handler))
        .route("/logs/status", get(status_handler))
        .route("/logs/flush", post(flush_handler))
        .with_state(sink)
}

/// Start the query server
///
/// # Arguments
/// * `addr` - Address to listen on (port 0 picks a free port)
/// * `sink` - Sink to serve lines from
///
/// # Returns
/// A `ServerHandle` that can be used to shut down the server
pub async fn start(addr: SocketAddr, sink: Arc<LogSink>) -> Result<ServerHandle> {
    let app = router(sink);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Log query server listening on {}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
                info!("Log query server shutting down");
            })
            .await
            .ok();
    });

    Ok(ServerHandle {
        shutdown_tx: Some(shutdown_tx),
        addr: bound_addr,
    })
}

/// GET /logs?lines=N
///
/// Serves from memory. After a restart the buffer is empty, so the tail of the
/// persisted file is returned instead.
async fn logs_handler(
    State(sink): State<Arc<LogSink>>,
    Query(query): Query<LogsQuery>,
) -> (StatusCode, String) {
    let lines = query.lines.unwrap_or(DEFAULT_QUERY_LINES);
    debug!(lines, "Log query");

    let text = sink.get_last_n(lines);
    if !text.is_empty() || lines == 0 {
        return (StatusCode::OK, text);
    }

    let path = sink.file_path();
    let fallback = tokio::task::spawn_blocking(move || read_tail(&path, lines)).await;
    match fallback {
        Ok(Ok(tail)) => (StatusCode::OK, tail.join("\n")),
        // Nothing buffered and nothing persisted yet
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => (StatusCode::OK, String::new()),
        Ok(Err(e)) => {
            warn!("Failed to read log file tail: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /logs/status
async fn status_handler(State(sink): State<Arc<LogSink>>) -> Json<SinkStats> {
    Json(sink.stats())
}

/// POST /logs/flush
async fn flush_handler(
    State(sink): State<Arc<LogSink>>,
) -> Result<Json<SinkStats>, (StatusCode, String)> {
    let flush_sink = Arc::clone(&sink);
    let result = tokio::task::spawn_blocking(move || flush_sink.flush_now())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match result {
        Ok(outcome) => {
            debug!(?outcome, "Flush requested over HTTP");
            Ok(Json(sink.stats()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::SinkConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn create_test_sink(temp_dir: &TempDir) -> Arc<LogSink> {
        Arc::new(
            LogSink::new(SinkConfig {
                flush_interval: Duration::from_secs(60),
                ..SinkConfig::new(temp_dir.path().join("log.txt"))
            })
            .unwrap(),
        )
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_logs_returns_last_lines() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);
        sink.add("2026-01-21 10:00:00 - INFO - one");
        sink.add("2026-01-21 10:00:01 - INFO - two");
        sink.add("2026-01-21 10:00:02 - INFO - three");

        let response = router(sink)
            .oneshot(get_request("/logs?lines=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            "2026-01-21 10:00:01 - INFO - two\n2026-01-21 10:00:02 - INFO - three"
        );
    }

    #[tokio::test]
    async fn test_logs_default_line_count() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);
        for i in 0..150 {
            sink.add(&format!("line {}", i));
        }

        let response = router(sink).oneshot(get_request("/logs")).await.unwrap();
        assert_eq!(body_text(response).await.lines().count(), DEFAULT_QUERY_LINES);
    }

    #[tokio::test]
    async fn test_logs_falls_back_to_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("log.txt"),
            "persisted 1\npersisted 2\npersisted 3\n",
        )
        .unwrap();
        let sink = create_test_sink(&temp_dir);

        let response = router(sink)
            .oneshot(get_request("/logs?lines=2"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "persisted 2\npersisted 3");
    }

    #[tokio::test]
    async fn test_logs_empty_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);

        let response = router(sink).oneshot(get_request("/logs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "");
    }

    #[tokio::test]
    async fn test_logs_invalid_query() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);

        let response = router(sink)
            .oneshot(get_request("/logs?lines=many"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_reports_stats() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);
        sink.add("pending");

        let response = router(sink)
            .oneshot(get_request("/logs/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(stats["buffered"], 1);
        assert_eq!(stats["unwritten"], 1);
        assert_eq!(stats["rolled_over"], false);
        assert_eq!(stats["min_level"], "INFO");
    }

    #[tokio::test]
    async fn test_flush_endpoint_persists() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);
        sink.add("made durable");

        let request = Request::builder()
            .method("POST")
            .uri("/logs/flush")
            .body(Body::empty())
            .unwrap();
        let response = router(Arc::clone(&sink)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stats: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(stats["unwritten"], 0);
        assert_eq!(stats["lines_written"], 1);

        let persisted = std::fs::read_to_string(temp_dir.path().join("log.txt")).unwrap();
        assert!(persisted.ends_with(" - INFO - made durable\n"));
    }

    #[tokio::test]
    async fn test_server_starts_and_shuts_down() {
        let temp_dir = TempDir::new().unwrap();
        let sink = create_test_sink(&temp_dir);

        // Use port 0 to let OS assign an available port
        let handle = start(SocketAddr::from(([127, 0, 0, 1], 0)), sink)
            .await
            .unwrap();
        let addr = handle.addr();
        assert!(addr.port() > 0);
        assert!(tokio::net::TcpStream::connect(addr).await.is_ok());

        handle.shutdown().unwrap();

        // Give server time to shut down
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
