use crate::config::RelayConfig;
use crate::protocol::{IngressCounters, ProtocolHandler};
use futures::{SinkExt, StreamExt};
use liftboard_hub::SharedHub;
use log::{debug, info, warn};
use miette::Diagnostic;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error, Diagnostic)]
pub enum IngressError {
    #[error("failed to bind the ingress listener on port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    BadMinimumVersion(#[from] fopwire::VersionParseError),
}

/// Where the upstream connection currently stands, for operator UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngressStatus {
    Starting,
    Listening,
    Connected { peer: String },
    Disconnected,
    FailedToStart { reason: String },
}

/// Handle onto the ingress background task: its connection status and
/// frame counters. Cloneable so the web layer can hold one.
#[derive(Clone)]
pub struct IngressTask {
    status: Arc<RwLock<IngressStatus>>,
    counters: Arc<IngressCounters>,
}

impl IngressTask {
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(IngressStatus::Starting)),
            counters: Arc::new(IngressCounters::default()),
        }
    }

    pub fn status(&self) -> IngressStatus {
        self.status.read().expect("ingress status lock poisoned").clone()
    }

    pub fn counters(&self) -> Arc<IngressCounters> {
        self.counters.clone()
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.set_status(IngressStatus::FailedToStart {
            reason: reason.into(),
        });
    }

    fn set_status(&self, status: IngressStatus) {
        *self.status.write().expect("ingress status lock poisoned") = status;
    }
}

impl Default for IngressTask {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept the meet-management server's WebSocket connection and pump
/// frames through the protocol handler until shutdown. The upstream
/// reconnecting is normal; the loop just keeps accepting.
pub async fn run_ingress(
    config: RelayConfig,
    hub: SharedHub,
    task: IngressTask,
    shutdown: CancellationToken,
) -> Result<(), IngressError> {
    let handler = Arc::new(ProtocolHandler::new(hub, task.counters(), &config)?);

    let listener = TcpListener::bind(("0.0.0.0", config.ingress_port))
        .await
        .map_err(|source| IngressError::Bind {
            port: config.ingress_port,
            source,
        })?;
    task.set_status(IngressStatus::Listening);
    info!(
        "Ingress listening on port {} at {}",
        config.ingress_port, config.ingress_path
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let connection = Connection {
                        handler: handler.clone(),
                        task: task.clone(),
                        expected_path: config.ingress_path.clone(),
                        shutdown: shutdown.clone(),
                    };
                    tokio::spawn(async move {
                        connection.serve(stream, peer.to_string()).await;
                    });
                }
                Err(err) => warn!("Failed to accept ingress connection: {err}"),
            },
        }
    }

    info!("Ingress listener shutting down");
    Ok(())
}

struct Connection {
    handler: Arc<ProtocolHandler>,
    task: IngressTask,
    expected_path: String,
    shutdown: CancellationToken,
}

impl Connection {
    async fn serve(&self, stream: TcpStream, peer: String) {
        let expected_path = self.expected_path.clone();
        let check_path = |request: &Request, response: Response| {
            if request.uri().path() == expected_path {
                Ok(response)
            } else {
                warn!(
                    "Rejecting ingress connection to unexpected path {}",
                    request.uri().path()
                );
                let mut not_found = ErrorResponse::new(None);
                *not_found.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
                Err(not_found)
            }
        };

        let websocket = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
            Ok(websocket) => websocket,
            Err(err) => {
                warn!("Ingress handshake with {peer} failed: {err}");
                return;
            }
        };

        info!("Upstream connected from {peer}");
        self.task.set_status(IngressStatus::Connected { peer: peer.clone() });

        let (mut sink, mut source) = websocket.split();
        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                message = source.next() => message,
            };

            let reply = match message {
                Some(Ok(Message::Text(text))) => self.handler.handle_text(&text),
                Some(Ok(Message::Binary(bytes))) => self.handler.handle_binary(bytes).await,
                Some(Ok(Message::Close(_))) | None => {
                    info!("Upstream {peer} closed the connection");
                    break;
                }
                // Pings are answered by the protocol layer underneath.
                Some(Ok(other)) => {
                    debug!("Ignoring control frame from {peer}: {other:?}");
                    continue;
                }
                Some(Err(err)) => {
                    warn!("Ingress read from {peer} failed: {err}");
                    break;
                }
            };

            if let Err(err) = sink.send(Message::Text(reply.to_json())).await {
                warn!("Failed to send reply to {peer}: {err}");
                break;
            }
        }

        self.task.set_status(IngressStatus::Disconnected);
    }
}
