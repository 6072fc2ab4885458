//! Bridge lifecycle
//!
//! Wires the WebSocket client's inbound dispatch to the message router and
//! owns start/stop.

use crate::error::Result;
use crate::message::MessageRouter;
use crate::ws::WsClient;
use std::sync::Arc;

/// Connects the WebSocket client to the message router
pub struct Orchestrator {
    ws_client: WsClient,
    router: Arc<MessageRouter>,
}

impl Orchestrator {
    /// Register the router as an inbound handler of the client
    pub async fn new(ws_client: WsClient, router: Arc<MessageRouter>) -> Self {
        ws_client.register_handler(router.clone()).await;
        Self { ws_client, router }
    }

    /// Open the backend connection
    pub async fn start(&self) -> Result<()> {
        tracing::info!(url = %self.ws_client.url(), "Starting Conductor bridge");
        self.ws_client.connect().await
    }

    /// Close the backend connection and stop its background loops
    pub async fn stop(&self) {
        self.ws_client.disconnect().await;
        tracing::info!("Conductor bridge stopped");
    }

    pub fn ws_client(&self) -> &WsClient {
        &self.ws_client
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }
}
