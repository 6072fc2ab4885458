//! WebSocket connection management
//!
//! - `client`: reconnecting client with per-connection listen/heartbeat loops
//! - `transport`: the dialing seam and the tokio-tungstenite implementation
//! - `handler`: inbound handler trait and closure adapters

mod client;
mod handler;
mod transport;

pub use client::{
    ConnectionState, WeakWsClient, WsClient, WsClientBuilder, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_RECONNECT_DELAY,
};
pub use handler::{async_handler, sync_handler, InboundHandler};
pub use transport::{build_request, Connector, Transport, TungsteniteConnector, WsSink, WsStream};
