//! HTTP [`SyncTransport`] built on `reqwest`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use smarttable_core::{SyncTarget, SyncTransport, ViewState};

use crate::config::{BackendSyncConfig, SyncEncoding};
use crate::error::ConfigurationError;

/// POSTs the snapshot to the target endpoint.
///
/// Sends `Authorization: Bearer <token>` when a token is set, every extra
/// header from the target, and the snapshot as JSON or named-field MessagePack.
/// Non-2xx responses are errors.
#[derive(Debug, Clone)]
pub struct HttpSyncTransport {
    client: reqwest::Client,
    encoding: SyncEncoding,
}

impl HttpSyncTransport {
    /// # Errors
    ///
    /// Returns [`ConfigurationError::HttpClient`] if the client cannot be built.
    pub fn new(timeout: Duration, encoding: SyncEncoding) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigurationError::HttpClient(e.to_string()))?;
        Ok(Self { client, encoding })
    }

    /// Transport matching a backend sync configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::HttpClient`] if the client cannot be built.
    pub fn from_config(config: &BackendSyncConfig) -> Result<Self, ConfigurationError> {
        Self::new(config.request_timeout, config.encoding)
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn sync(&self, target: &SyncTarget, snapshot: &ViewState) -> anyhow::Result<()> {
        let mut request = self.client.post(&target.endpoint);
        if let Some(token) = &target.token {
            request = request.bearer_auth(token);
        }
        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = match self.encoding {
            SyncEncoding::Json => request.json(snapshot),
            SyncEncoding::MsgPack => request
                .header(CONTENT_TYPE, "application/msgpack")
                .body(rmp_serde::to_vec_named(snapshot).context("encoding snapshot")?),
        };

        request
            .send()
            .await
            .with_context(|| format!("POST {}", target.endpoint))?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use smarttable_core::{SortingRule, ViewStatePatch};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts one connection, returns the raw request and answers `status`.
    async fn serve_once(status: &'static str) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/table-state", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                if n == 0 || is_complete(&request) {
                    break;
                }
            }
            let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            request
        });

        (url, handle)
    }

    fn is_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..split]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        request.len() >= split + 4 + length
    }

    fn body(request: &[u8]) -> &[u8] {
        let split = request.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        &request[split + 4..]
    }

    fn snapshot() -> ViewState {
        ViewState::default().merged(&ViewStatePatch::new().sorting(vec![SortingRule::desc("age")]))
    }

    #[tokio::test]
    async fn posts_json_with_auth_and_headers() {
        let (url, server) = serve_once("204 No Content").await;
        let transport = HttpSyncTransport::new(Duration::from_secs(5), SyncEncoding::Json).unwrap();
        let target = SyncTarget {
            endpoint: url,
            token: Some("secret".to_string()),
            headers: BTreeMap::from([("x-table-id".to_string(), "people".to_string())]),
        };

        transport.sync(&target, &snapshot()).await.unwrap();

        let raw = server.await.unwrap();
        let head = String::from_utf8_lossy(&raw).to_lowercase();
        assert!(head.starts_with("post /table-state"));
        assert!(head.contains("authorization: bearer secret"));
        assert!(head.contains("x-table-id: people"));
        assert!(head.contains("content-type: application/json"));

        let sent: ViewState = serde_json::from_slice(body(&raw)).unwrap();
        assert_eq!(sent, snapshot());
    }

    #[tokio::test]
    async fn posts_msgpack_when_configured() {
        let (url, server) = serve_once("200 OK").await;
        let transport =
            HttpSyncTransport::new(Duration::from_secs(5), SyncEncoding::MsgPack).unwrap();
        let target = SyncTarget {
            endpoint: url,
            ..SyncTarget::default()
        };

        transport.sync(&target, &snapshot()).await.unwrap();

        let raw = server.await.unwrap();
        let head = String::from_utf8_lossy(&raw).to_lowercase();
        assert!(head.contains("content-type: application/msgpack"));
        assert!(!head.contains("authorization"));
        let sent: ViewState = rmp_serde::from_slice(body(&raw)).unwrap();
        assert_eq!(sent, snapshot());
    }

    #[tokio::test]
    async fn error_status_is_a_failure() {
        let (url, server) = serve_once("500 Internal Server Error").await;
        let transport = HttpSyncTransport::new(Duration::from_secs(5), SyncEncoding::Json).unwrap();
        let target = SyncTarget {
            endpoint: url,
            ..SyncTarget::default()
        };

        assert!(transport.sync(&target, &snapshot()).await.is_err());
        server.await.unwrap();
    }
}
