//! Endpoint server for exposing metrics, health checks and asset status

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::metrics::metrics;
use crate::structured_logging::StatusBoard;

const TEXT: &str = "text/plain; version=0.0.4";
const JSON: &str = "application/json";

/// Start the endpoint server
pub async fn endpoint_server(port: u16, board: Arc<StatusBoard>) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Metrics endpoint listening on {}", addr);
    serve(listener, board).await
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, board: Arc<StatusBoard>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((socket, _)) => {
                let board = Arc::clone(&board);
                tokio::spawn(async move {
                    if let Err(e) = handle(socket, &board).await {
                        tracing::error!("Failed to serve endpoint request: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle(mut socket: TcpStream, board: &StatusBoard) -> Result<()> {
    let mut buf = [0; 1024];
    let n = socket.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/");

    let (status, content_type, body) = match path {
        "/metrics" => ("200 OK", TEXT, metrics().encode_text()?),
        "/health" => ("200 OK", TEXT, "ok".to_string()),
        "/status" => ("200 OK", JSON, serde_json::to_string(&board.view())?),
        _ => ("404 Not Found", TEXT, "not found".to_string()),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PendingRegistry;
    use crate::structured_logging::{StatusJournal, StatusReporter};
    use crate::test_utils::sample_record;

    fn empty_board() -> Arc<StatusBoard> {
        Arc::new(StatusBoard::new(
            Arc::new(PendingRegistry::new()),
            Arc::new(StatusJournal::new(8)),
        ))
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path).as_bytes())
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_metrics_and_health_routes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, empty_board()));

        metrics().candidates_detected.inc();
        let response = get(port, "/metrics").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("candidates_detected_total"));

        assert!(get(port, "/health").await.ends_with("ok"));
        assert!(get(port, "/nope").await.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_status_route_lists_assets_and_events() {
        let registry = Arc::new(PendingRegistry::new());
        let record = sample_record(1_010_101_011);
        let mint = record.mint;
        registry.add(record);

        let journal = Arc::new(StatusJournal::new(8));
        let reporter = StatusReporter::new();
        let follower = journal.clone().follow(&reporter);
        reporter.info(&mint, "admitted");
        drop(reporter);
        follower.await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve(listener, Arc::new(StatusBoard::new(registry, journal))));

        let response = get(port, "/status").await;
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.contains("Content-Type: application/json"));

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let view: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(view["assets"][0]["mint"], mint.to_string());
        assert_eq!(view["assets"][0]["state"], "Pending");
        assert_eq!(view["events"][0]["message"], "admitted");
    }
}
