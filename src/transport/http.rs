use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::{AppError, Result};
use crate::http::pool::create_http_client;
use crate::transport::Transport;

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        Ok(Self {
            client: create_http_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &Url, headers: HeaderMap, body: Vec<u8>) -> Result<u16> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(AppError::Http)?;

        let status = response.status().as_u16();
        debug!("POST {} -> {} in {}ms", url, status, start.elapsed().as_millis());

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderValue, CONTENT_TYPE};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn plain_http_config() -> GatewayConfig {
        GatewayConfig {
            https_only: false,
            ..GatewayConfig::default()
        }
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n")
    }

    /// Accepts one connection, answers with `status_line`, returns the raw request.
    async fn serve_once(status_line: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let body_len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .map(|v| v.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + body_len {
                        break;
                    }
                }
            }

            let response = format!("{}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(buf).unwrap()
        });

        let url = Url::parse(&format!("http://{}/api/v3/1k/documents/create", addr)).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn test_posts_body_and_headers() {
        let (url, server) = serve_once("HTTP/1.1 201 Created").await;
        let transport = HttpTransport::new(&plain_http_config()).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("signature", HeaderValue::from_static("sig-123"));

        let status = transport.send(&url, headers, br#"{"docType":"x"}"#.to_vec()).await.unwrap();
        assert_eq!(status, 201);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v3/1k/documents/create HTTP/1.1"));
        assert!(request.contains("\r\nContent-Type: application/json\r\n"));
        assert!(request.contains("\r\nSignature: sig-123\r\n"));
        assert!(request.ends_with(r#"{"docType":"x"}"#));
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let transport = HttpTransport::new(&plain_http_config()).unwrap();

        let status = transport.send(&url, HeaderMap::new(), Vec::new()).await.unwrap();
        assert_eq!(status, 503);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_with_client_uses_supplied_client() {
        let (url, server) = serve_once("HTTP/1.1 202 Accepted").await;
        let client = Client::builder().build().unwrap();
        let transport = HttpTransport::with_client(client);

        let status = transport.send(&url, HeaderMap::new(), b"{}".to_vec()).await.unwrap();
        assert_eq!(status, 202);
        assert!(server.await.unwrap().ends_with("{}"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(&plain_http_config()).unwrap();
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();
        let err = transport.send(&url, HeaderMap::new(), Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Http(_)));
    }
}
