//! Outbound peer calls.

use crate::error::{NetworkError, Result};
use crate::net::rpc::{self, Request, Response, MAX_FRAME};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Configuration for transport behavior.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Deadline for a whole call, connect included.
    pub call_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// The single capability the core needs from the network: write one
/// request to a peer and wait for its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, addr: &str, request: Request) -> Result<Response>;
}

/// TCP transport opening one connection per call.
#[derive(Debug, Default)]
pub struct TcpTransport {
    config: TransportConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self { config }
    }

    async fn call_inner(&self, addr: &str, request: &Request) -> Result<Response> {
        let mut stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetworkError::Unreachable {
                addr: addr.to_string(),
                reason: "connect timed out".to_string(),
            })?
            .map_err(|e| NetworkError::Unreachable {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        let framed = rpc::frame(request).map_err(|e| NetworkError::Codec(e.to_string()))?;
        stream.write_all(&framed).await.map_err(NetworkError::Io)?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(NetworkError::Io)?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME {
            return Err(NetworkError::OversizedFrame(len).into());
        }

        let mut body = vec![0u8; len as usize];
        stream
            .read_exact(&mut body)
            .await
            .map_err(NetworkError::Io)?;

        rpc::decode(&body).map_err(|e| NetworkError::Codec(e.to_string()).into())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, addr: &str, request: Request) -> Result<Response> {
        match timeout(self.config.call_timeout, self.call_inner(addr, &request)).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout.into()),
        }
    }
}
