//! Authentication proxy client over a Unix socket.
//!
//! Every request opens a connection, writes one JSON line and reads one JSON
//! line back. The controller on the other end owns the proxy process.

use apc::{AuthProxy, ProxyStatus, RouterId};
use async_trait::async_trait;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Request sent to the proxy controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProxyRequest {
    Start { membership: Vec<RouterId> },
    Stop,
    Status,
}

/// Reply from the proxy controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProxyStatus>,
}

/// [`AuthProxy`] backed by a JSON-lines Unix socket
pub struct UnixSocketAuthProxy {
    socket_path: PathBuf,
    timeout: Duration,
}

impl UnixSocketAuthProxy {
    pub fn new(socket_path: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            timeout,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a request and wait for its reply, bounded by the timeout
    pub async fn request(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::auth_proxy(format!(
                "no reply from {} within {:?}",
                self.socket_path.display(),
                self.timeout
            ))),
        }
    }

    async fn exchange(&self, request: &ProxyRequest) -> Result<ProxyResponse> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::auth_proxy(format!("connect {}: {}", self.socket_path.display(), e))
        })?;

        let (reader, mut writer) = stream.into_split();

        let json = serde_json::to_string(request)?;
        debug!("Sending request to proxy: {}", json);
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(Error::auth_proxy("connection closed without a reply"));
        }

        let response: ProxyResponse = serde_json::from_str(line.trim())?;
        debug!(?response, "Received reply from proxy");
        Ok(response)
    }

    /// Turn a negative reply into an error
    fn accepted(response: ProxyResponse) -> Result<ProxyResponse> {
        if response.ok {
            Ok(response)
        } else {
            Err(Error::auth_proxy(
                response
                    .error
                    .unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }
}

#[async_trait]
impl AuthProxy for UnixSocketAuthProxy {
    async fn start(&self, membership: Vec<RouterId>) -> Result<()> {
        let response = self.request(&ProxyRequest::Start { membership }).await?;
        Self::accepted(response).map(|_| ())
    }

    async fn stop(&self) -> Result<()> {
        let response = self.request(&ProxyRequest::Stop).await?;
        Self::accepted(response).map(|_| ())
    }

    async fn status(&self) -> Result<ProxyStatus> {
        let response = Self::accepted(self.request(&ProxyRequest::Status).await?)?;
        response
            .status
            .ok_or_else(|| Error::auth_proxy("status reply without a status"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_format() {
        let start = ProxyRequest::Start {
            membership: vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()],
        };
        assert_eq!(
            serde_json::to_string(&start).unwrap(),
            r#"{"type":"start","membership":["10.0.0.1","10.0.0.2"]}"#
        );
        assert_eq!(
            serde_json::to_string(&ProxyRequest::Stop).unwrap(),
            r#"{"type":"stop"}"#
        );
    }

    #[test]
    fn test_response_defaults() {
        let response: ProxyResponse = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(response.ok);
        assert!(response.error.is_none());
        assert!(response.status.is_none());

        let rejected = UnixSocketAuthProxy::accepted(ProxyResponse {
            ok: false,
            error: Some("busy".to_string()),
            status: None,
        });
        assert!(matches!(rejected, Err(Error::AuthProxy(msg)) if msg == "busy"));
    }

    #[tokio::test]
    async fn test_missing_socket_is_an_error() {
        let proxy = UnixSocketAuthProxy::new("/nonexistent/apc.sock", Duration::from_millis(100));
        assert!(proxy.stop().await.is_err());
    }
}
