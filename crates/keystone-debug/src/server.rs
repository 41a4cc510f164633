//! TCP debug server

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::protocol::{DebugCommand, DebugResponse};

/// Answer to a command: either immediate, or a future the server awaits
/// after releasing the handler lock
pub enum DebugReply {
    Ready(DebugResponse),
    Deferred(Pin<Box<dyn Future<Output = DebugResponse> + Send>>),
}

impl DebugReply {
    pub fn deferred(future: impl Future<Output = DebugResponse> + Send + 'static) -> Self {
        Self::Deferred(Box::pin(future))
    }

    async fn resolve(self) -> DebugResponse {
        match self {
            Self::Ready(response) => response,
            Self::Deferred(future) => future.await,
        }
    }
}

impl From<DebugResponse> for DebugReply {
    fn from(response: DebugResponse) -> Self {
        Self::Ready(response)
    }
}

/// Trait that the application implements to handle debug commands
pub trait DebugHandler: Send + Sync + 'static {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugReply;
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("Failed to bind debug server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Debug server handle - keep this alive to keep the server running
pub struct DebugServer {
    _handle: tokio::task::JoinHandle<()>,
    local_addr: Option<SocketAddr>,
}

impl DebugServer {
    /// Start the debug server on the given port.
    /// The handler is called for each incoming command.
    /// Returns immediately -- server runs in background.
    pub fn start(handler: Arc<Mutex<dyn DebugHandler>>, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            let listener = match TcpListener::bind(&addr).await {
                Ok(l) => {
                    log::info!("Debug server listening on {}", addr);
                    l
                }
                Err(e) => {
                    log::error!("Failed to bind debug server on {}: {}", addr, e);
                    return;
                }
            };
            accept_loop(listener, handler).await;
        });

        Self {
            _handle: handle,
            local_addr: None,
        }
    }

    /// Bind first, then serve in the background. Port 0 picks a free port,
    /// reported by [`local_addr`](Self::local_addr).
    pub async fn bind(
        handler: Arc<Mutex<dyn DebugHandler>>,
        addr: &str,
    ) -> Result<Self, DebugError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| DebugError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().ok();
        log::info!("Debug server listening on {:?}", local_addr);
        let handle = tokio::spawn(accept_loop(listener, handler));
        Ok(Self {
            _handle: handle,
            local_addr,
        })
    }

    /// Address the server is bound to, when started with [`bind`](Self::bind)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn accept_loop(listener: TcpListener, handler: Arc<Mutex<dyn DebugHandler>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("Debug client connected from {}", peer);
                let handler = handler.clone();
                tokio::spawn(async move {
                    handle_connection(stream, handler).await;
                    log::info!("Debug client disconnected: {}", peer);
                });
            }
            Err(e) => {
                log::error!("Debug server accept error: {}", e);
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    handler: Arc<Mutex<dyn DebugHandler>>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // Connection closed
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let reply = match serde_json::from_str::<DebugCommand>(trimmed) {
                    Ok(cmd) => {
                        log::debug!("Debug command: {:?}", cmd);
                        let mut h = handler.lock().await;
                        h.handle_command(cmd)
                    }
                    Err(e) => DebugResponse::error(format!("Invalid command JSON: {}", e)).into(),
                };
                let response = reply.resolve().await;

                let mut resp_json =
                    serde_json::to_string(&response).unwrap_or_else(|e| {
                        format!(
                            "{{\"status\":\"error\",\"message\":\"Serialize error: {}\"}}",
                            e
                        )
                    });
                resp_json.push('\n');

                if let Err(e) = writer.write_all(resp_json.as_bytes()).await {
                    log::error!("Debug server write error: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    log::error!("Debug server flush error: {}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Debug server read error: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseData;
    use tokio::net::TcpStream;

    struct Echo;

    impl DebugHandler for Echo {
        fn handle_command(&mut self, cmd: DebugCommand) -> DebugReply {
            match cmd {
                DebugCommand::Ping => DebugResponse::pong().into(),
                DebugCommand::Validate => DebugReply::deferred(async {
                    DebugResponse::ok(ResponseData::Validation {
                        valid: true,
                        message: None,
                    })
                }),
                _ => DebugResponse::error("unsupported").into(),
            }
        }
    }

    async fn roundtrip(addr: SocketAddr, lines: &[&str]) -> Vec<DebugResponse> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut responses = Vec::new();
        for line in lines {
            writer.write_all(format!("{}\n", line).as_bytes()).await.unwrap();
            let mut reply = String::new();
            reader.read_line(&mut reply).await.unwrap();
            responses.push(serde_json::from_str(reply.trim()).unwrap());
        }
        responses
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_ready_and_deferred_replies() {
        let handler: Arc<Mutex<dyn DebugHandler>> = Arc::new(Mutex::new(Echo));
        let server = DebugServer::bind(handler, "127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let responses = roundtrip(
            addr,
            &[r#"{"cmd":"Ping"}"#, r#"{"cmd":"Validate"}"#, r#"{"cmd":"Stats"}"#, "not json"],
        )
        .await;
        assert_eq!(responses[0], DebugResponse::pong());
        assert_eq!(
            responses[1],
            DebugResponse::ok(ResponseData::Validation {
                valid: true,
                message: None
            })
        );
        assert_eq!(responses[2], DebugResponse::error("unsupported"));
        assert!(matches!(
            &responses[3],
            DebugResponse::Error { message } if message.starts_with("Invalid command JSON")
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bind_error_reports_address() {
        let handler: Arc<Mutex<dyn DebugHandler>> = Arc::new(Mutex::new(Echo));
        let first = DebugServer::bind(handler.clone(), "127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();
        match DebugServer::bind(handler, &taken).await {
            Err(DebugError::Bind { addr, .. }) => assert_eq!(addr, taken),
            Ok(_) => panic!("second bind on {} succeeded", taken),
        }
    }
}
