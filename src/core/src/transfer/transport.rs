//! Outbound connections used by the transfer worker.
//!
//! The worker only sees the [`Transport`] and [`Connection`] traits; the
//! production implementation is [`WebSocketTransport`], which opens one
//! WebSocket session per artifact and ships the file as a single binary
//! message.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::configuration::types::TransferConfig;
use crate::data_capture::types::CaptureArtifact;
use crate::error_handling::types::TransferError;
use crate::identity::IdentityContext;

/// How long the close handshake may take before the session is abandoned.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where one artifact is delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub user_id: u64,
    pub sensor_id: String,
    pub interface: String,
    pub capture_number: u64,
}

impl Destination {
    pub fn for_artifact(
        identity: &IdentityContext,
        transfer: &TransferConfig,
        artifact: &CaptureArtifact,
    ) -> Self {
        Self {
            secure: transfer.secure,
            host: identity.server_host.clone(),
            port: identity.server_port,
            path: transfer.path.clone(),
            user_id: identity.user_id,
            sensor_id: identity.sensor_id.clone(),
            interface: artifact.interface.clone(),
            capture_number: artifact.sequence,
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{scheme}://{host}:{port}{path}?userId={user}&sensorId={sensor}&interfaceNo={iface}&captureNumber={seq}",
            scheme = if self.secure { "wss" } else { "ws" },
            host = self.host,
            port = self.port,
            path = self.path,
            user = self.user_id,
            sensor = self.sensor_id,
            iface = self.interface,
            seq = self.capture_number,
        )
    }
}

/// Opens outbound connections to the collection server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, destination: &Destination)
        -> Result<Box<dyn Connection>, TransferError>;
}

/// One open outbound session.
#[async_trait]
pub trait Connection: Send {
    /// Sends the whole payload as one message.
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransferError>;

    async fn close(self: Box<Self>) -> Result<(), TransferError>;
}

/// WebSocket transport authenticating with a bearer token header.
///
/// The handshake and each send are bounded by `timeout`; a server that
/// accepts TCP but never answers surfaces as an ordinary failed attempt.
pub struct WebSocketTransport {
    authorization: String,
    timeout: Duration,
}

impl WebSocketTransport {
    /// `authorization` is the full header value, e.g. `Bearer <token>`.
    pub fn new(authorization: String, timeout: Duration) -> Self {
        Self {
            authorization,
            timeout,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        destination: &Destination,
    ) -> Result<Box<dyn Connection>, TransferError> {
        let url = destination.url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransferError::InvalidRequest(e.to_string()))?;
        let auth = HeaderValue::from_str(&self.authorization)
            .map_err(|e| TransferError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        debug!("[transfer] Connecting to {}", url);
        let (stream, response) = tokio::time::timeout(self.timeout, connect_async(request))
            .await
            .map_err(|_| {
                TransferError::ConnectionFailed(format!(
                    "no handshake response within {}s",
                    self.timeout.as_secs_f32()
                ))
            })?
            .map_err(map_ws_error)?;
        trace!("[transfer] Handshake completed with status {}", response.status());

        Ok(Box::new(WebSocketConnection {
            stream,
            timeout: self.timeout,
        }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    timeout: Duration,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransferError> {
        let timeout = self.timeout;
        tokio::time::timeout(timeout, self.stream.send(Message::Binary(payload.into())))
            .await
            .map_err(|_| {
                TransferError::SendFailed(format!(
                    "send did not complete within {}s",
                    timeout.as_secs_f32()
                ))
            })?
            .map_err(map_ws_error)
    }

    async fn close(self: Box<Self>) -> Result<(), TransferError> {
        let WebSocketConnection { mut stream, timeout } = *self;
        tokio::time::timeout(timeout, stream.close(None))
            .await
            .map_err(|_| {
                TransferError::ConnectionClosed(String::from("close frame not sent in time"))
            })?
            .map_err(map_ws_error)?;

        // Wait for the server's close frame so the session ends cleanly.
        let drained = tokio::time::timeout(CLOSE_TIMEOUT, async {
            while let Some(msg) = stream.next().await {
                if msg.is_err() {
                    break;
                }
            }
        })
        .await;
        if drained.is_err() {
            debug!("[transfer] Server did not complete the close handshake in time");
        }
        Ok(())
    }
}

fn map_ws_error(err: WsError) -> TransferError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            TransferError::ConnectionClosed(err.to_string())
        }
        WsError::Io(_) | WsError::Http(_) | WsError::HttpFormat(_) => {
            TransferError::ConnectionFailed(err.to_string())
        }
        WsError::Url(_) => TransferError::InvalidRequest(err.to_string()),
        other => TransferError::SendFailed(other.to_string()),
    }
}
