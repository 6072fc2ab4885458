//! Component wiring
//!
//! Builds the session store, router, WebSocket client, orchestrator, tool
//! facade and reporter from one configuration, with the WebSocket client
//! as the router's backend sender. The router holds the client weakly, so
//! dropping the runtime closes the connection even without `stop()`.

use crate::config::ConductorConfig;
use crate::error::Result;
use crate::message::MessageRouter;
use crate::orchestrator::Orchestrator;
use crate::reporter::EventReporter;
use crate::session::SessionManager;
use crate::tools::ToolServer;
use crate::ws::WsClient;
use std::sync::Arc;

/// Fully wired bridge
pub struct ConductorRuntime {
    pub sessions: Arc<SessionManager>,
    pub router: Arc<MessageRouter>,
    pub orchestrator: Orchestrator,
    pub tools: ToolServer,
    pub reporter: EventReporter,
}

impl ConductorRuntime {
    pub async fn from_config(config: &ConductorConfig) -> Result<Self> {
        Ok(Self::with_client(WsClient::new(config)?).await)
    }

    /// Wire the components around an already-built client
    pub async fn with_client(ws_client: WsClient) -> Self {
        let sessions = Arc::new(SessionManager::new());
        let router = Arc::new(MessageRouter::new(sessions.clone()));
        router
            .register_outbound_handler(Arc::new(ws_client.downgrade()))
            .await;

        let orchestrator = Orchestrator::new(ws_client, router.clone()).await;
        let tools = ToolServer::new(sessions.clone(), router.clone());
        let reporter = EventReporter::new(router.clone());

        Self {
            sessions,
            router,
            orchestrator,
            tools,
            reporter,
        }
    }

    pub async fn start(&self) -> Result<()> {
        self.orchestrator.start().await
    }

    pub async fn stop(&self) {
        self.orchestrator.stop().await
    }
}
