//! WebSocket transport seam
//!
//! The client only needs a message sink and a message stream. Production
//! code dials with tokio-tungstenite; tests plug in channel-backed fakes.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::{Sink, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

/// Outgoing half of a connection
pub type WsSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;
/// Incoming half of a connection
pub type WsStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// An open, duplex connection
pub struct Transport {
    pub sink: WsSink,
    pub stream: WsStream,
}

impl Transport {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
        R: Stream<Item = std::result::Result<Message, WsError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Opens authenticated connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str, token: &str) -> Result<Transport>;
}

/// Build the upgrade request with the bearer credential attached
pub fn build_request(url: &str, token: &str) -> Result<Request> {
    let mut request = url.into_client_request()?;
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| Error::Config(format!("Invalid agent token: {}", e)))?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

/// Dials real WebSocket endpoints (ws:// and wss://)
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str, token: &str) -> Result<Transport> {
        let request = build_request(url, token)?;
        let (socket, response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");
        let (sink, stream) = socket.split();
        Ok(Transport::new(sink, stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_bearer_token() {
        let request = build_request("wss://api.conductor.local/ws/agent", "secret-token").unwrap();
        let header = request.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(header.to_str().unwrap(), "Bearer secret-token");
        assert!(header.is_sensitive());
        assert_eq!(request.uri().path(), "/ws/agent");
    }

    #[test]
    fn test_request_rejects_bad_url() {
        assert!(build_request("not a url", "t").is_err());
    }

    #[test]
    fn test_request_rejects_control_chars_in_token() {
        let err = build_request("ws://localhost/ws/agent", "bad\ntoken").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
