//! TCP server for handling inbound peer calls.

use crate::error::{NetworkError, Result};
use crate::net::rpc::{self, Request, Response, MAX_FRAME};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Handler for inbound requests.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle one request and produce its response.
    fn handle(&self, request: Request) -> Response;
}

/// TCP server for peer communication.
pub struct RpcServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    cancel: CancellationToken,
}

impl RpcServer {
    /// Bind the listening socket. The server does not accept connections
    /// until [`run`](Self::run).
    pub async fn bind(
        addr: &str,
        handler: Arc<dyn RequestHandler>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(NetworkError::Io)?;
        Ok(Self {
            listener,
            handler,
            cancel,
        })
    }

    /// The address the server actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| NetworkError::Io(e).into())
    }

    /// Accept connections until cancelled.
    pub async fn run(self) {
        info!(addr = ?self.listener.local_addr().ok(), "rpc server listening");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let handler = self.handler.clone();
                            let cancel = self.cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(stream, handler, cancel).await {
                                    debug!(error = %e, "connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    info!("rpc server shutting down");
                    break;
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        handler: Arc<dyn RequestHandler>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut write_buf = BytesMut::new();
        loop {
            let mut len_buf = [0u8; 4];

            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(()),

                result = stream.read_exact(&mut len_buf) => {
                    match result {
                        Ok(_) => {}
                        // peer closed between requests
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                        Err(e) => return Err(NetworkError::Io(e).into()),
                    }
                }
            }

            let len = u32::from_be_bytes(len_buf);
            if len > MAX_FRAME {
                return Err(NetworkError::OversizedFrame(len).into());
            }

            let mut body = vec![0u8; len as usize];
            stream
                .read_exact(&mut body)
                .await
                .map_err(NetworkError::Io)?;

            let request: Request =
                rpc::decode(&body).map_err(|e| NetworkError::Codec(e.to_string()))?;
            let response = handler.handle(request);

            write_buf.clear();
            rpc::frame_into(&response, &mut write_buf)
                .map_err(|e| NetworkError::Codec(e.to_string()))?;
            stream
                .write_all(&write_buf)
                .await
                .map_err(NetworkError::Io)?;
        }
    }
}
