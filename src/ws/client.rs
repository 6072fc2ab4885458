//! Self-healing WebSocket client
//!
//! One logical connection to the backend. Every physical connection gets a
//! listen loop and a heartbeat loop; when either ends while the client is
//! not stopped, both are retired and a fresh connection replaces them.
//! (Re)establishment is serialized by the connection mutex, so at most one
//! connect sequence runs at a time.

use super::handler::InboundHandler;
use super::transport::{Connector, Transport, TungsteniteConnector, WsSink, WsStream};
use crate::config::ConductorConfig;
use crate::error::{Error, Result};
use crate::message::{Envelope, OutboundHandler};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Delay between failed connection attempts
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
/// Interval between pings on a live connection
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being opened
    Disconnected,
    /// A connect sequence is in progress
    Connecting,
    /// A connection is live
    Connected,
    /// `disconnect()` is tearing the connection down
    Closing,
}

/// Builder for [`WsClient`]
pub struct WsClientBuilder {
    url: String,
    token: String,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    connector: Arc<dyn Connector>,
}

impl WsClientBuilder {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connector: Arc::new(TungsteniteConnector),
        }
    }

    /// Set the fixed delay between connection attempts
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the heartbeat interval; zero disables pings
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Replace the transport dialer
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> WsClient {
        let (stop, _) = watch::channel(false);
        WsClient {
            inner: Arc::new(Inner {
                url: self.url,
                token: self.token,
                reconnect_delay: self.reconnect_delay,
                heartbeat_interval: self.heartbeat_interval,
                connector: self.connector,
                handlers: RwLock::new(Vec::new()),
                stop,
                state: RwLock::new(ConnectionState::Disconnected),
                connection: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

/// Persistent WebSocket client with reconnect and heartbeat
#[derive(Clone)]
pub struct WsClient {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`WsClient`].
///
/// Components the client itself holds (such as an inbound handler that also
/// sends outbound) register this instead of a clone, so dropping the last
/// `WsClient` still shuts the connection down.
#[derive(Clone)]
pub struct WeakWsClient {
    inner: Weak<Inner>,
}

struct Inner {
    url: String,
    token: String,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    connector: Arc<dyn Connector>,
    handlers: RwLock<Vec<Arc<dyn InboundHandler>>>,
    /// Persistent stop flag, checked before every connection attempt
    stop: watch::Sender<bool>,
    state: RwLock<ConnectionState>,
    /// Exclusive section for (re)establishment
    connection: Mutex<Option<LiveConnection>>,
    next_id: AtomicU64,
}

/// Per-connection signals shared with its two loops
#[derive(Clone)]
struct Lifeline {
    id: u64,
    closed: Arc<AtomicBool>,
    cancel: CancellationToken,
}

struct LiveConnection {
    lifeline: Lifeline,
    sink: Arc<Mutex<WsSink>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveConnection {
    fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            sink: self.sink.clone(),
            closed: self.lifeline.closed.clone(),
        }
    }
}

struct ConnectionHandle {
    sink: Arc<Mutex<WsSink>>,
    closed: Arc<AtomicBool>,
}

enum Reopen {
    /// Always replace the current connection
    Force,
    /// Reuse the current connection unless it is known to be closed
    IfClosed,
    /// Replace the given connection, unless it was already replaced
    Replace(u64),
}

impl WsClient {
    /// Create a client for the configured backend
    pub fn new(config: &ConductorConfig) -> Result<Self> {
        let url = config.resolved_websocket_url()?;
        Ok(WsClientBuilder::new(url, config.agent_token.clone())
            .reconnect_delay(Duration::from_millis(config.connection.reconnect_delay_ms))
            .heartbeat_interval(Duration::from_secs(config.connection.heartbeat_interval_secs))
            .build())
    }

    pub fn builder(url: impl Into<String>, token: impl Into<String>) -> WsClientBuilder {
        WsClientBuilder::new(url, token)
    }

    pub fn downgrade(&self) -> WeakWsClient {
        WeakWsClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Endpoint this client dials
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Register an inbound handler; handlers run in registration order
    pub async fn register_handler(&self, handler: Arc<dyn InboundHandler>) {
        self.inner.handlers.write().await.push(handler);
    }

    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Clear the stop flag and (re)open the connection, retrying until it
    /// succeeds or `disconnect()` is called
    pub async fn connect(&self) -> Result<()> {
        self.inner.stop.send_replace(false);
        self.inner.open_connection(Reopen::Force).await?;
        Ok(())
    }

    /// Stop the client and tear down the live connection.
    ///
    /// Waits for the listen and heartbeat loops to finish, so it must not be
    /// awaited from inside an inbound handler.
    pub async fn disconnect(&self) {
        self.inner.stop.send_replace(true);
        self.inner.set_state(ConnectionState::Closing).await;

        let live = self.inner.connection.lock().await.take();
        if let Some(live) = live {
            live.lifeline.closed.store(true, Ordering::Release);
            live.lifeline.cancel.cancel();
            for task in live.tasks {
                let _ = task.await;
            }
            if let Err(e) = live.sink.lock().await.close().await {
                tracing::debug!(error = %e, "Error closing WebSocket");
            }
        }

        self.inner.set_state(ConnectionState::Disconnected).await;
        tracing::info!(url = %self.inner.url, "WebSocket client stopped");
    }

    /// Serialize and send a payload, opening a connection first if needed.
    ///
    /// Blocks through reconnect attempts; only fails on serialization or
    /// once the client has been stopped.
    pub async fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> Result<()> {
        let text = serde_json::to_string(payload)?;
        loop {
            let conn = self.inner.open_connection(Reopen::IfClosed).await?;
            let sent = conn.sink.lock().await.send(Message::Text(text.clone())).await;
            match sent {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket send failed, reconnecting");
                    conn.closed.store(true, Ordering::Release);
                }
            }
        }
    }
}

#[async_trait]
impl OutboundHandler for WsClient {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_json(envelope).await
    }
}

impl WeakWsClient {
    /// The client, if any strong handle is still alive
    pub fn upgrade(&self) -> Option<WsClient> {
        self.inner.upgrade().map(|inner| WsClient { inner })
    }
}

#[async_trait]
impl OutboundHandler for WeakWsClient {
    async fn send(&self, envelope: &Envelope) -> Result<()> {
        match self.upgrade() {
            Some(client) => client.send_json(envelope).await,
            None => Err(Error::Connection("client dropped".to_string())),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        if let Some(live) = self.connection.get_mut().take() {
            live.lifeline.closed.store(true, Ordering::Release);
            live.lifeline.cancel.cancel();
        }
    }
}

impl Inner {
    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    async fn open_connection(self: &Arc<Self>, mode: Reopen) -> Result<ConnectionHandle> {
        let mut slot = self.connection.lock().await;

        if let Some(live) = slot.as_ref() {
            let keep = match mode {
                Reopen::Force => false,
                Reopen::IfClosed => !live.lifeline.closed.load(Ordering::Acquire),
                Reopen::Replace(id) => live.lifeline.id != id,
            };
            if keep {
                return Ok(live.handle());
            }
        }
        if let Some(stale) = slot.take() {
            stale.lifeline.closed.store(true, Ordering::Release);
            stale.lifeline.cancel.cancel();
        }

        let mut stop_rx = self.stop.subscribe();
        loop {
            if *stop_rx.borrow_and_update() {
                return Err(Error::Connection("client stopped".to_string()));
            }
            self.set_state(ConnectionState::Connecting).await;

            let attempt = tokio::select! {
                result = self.connector.connect(&self.url, &self.token) => result,
                _ = stop_rx.wait_for(|stopped| *stopped) => {
                    return Err(Error::Connection("client stopped".to_string()));
                }
            };

            match attempt {
                Ok(transport) => {
                    let live = self.spawn_loops(transport);
                    let handle = live.handle();
                    tracing::info!(url = %self.url, connection_id = live.lifeline.id, "WebSocket connected");
                    *slot = Some(live);
                    self.set_state(ConnectionState::Connected).await;
                    return Ok(handle);
                }
                Err(e) => {
                    tracing::warn!(
                        url = %self.url,
                        error = %e,
                        retry_in_ms = self.reconnect_delay.as_millis() as u64,
                        "WebSocket connection failed"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = stop_rx.wait_for(|stopped| *stopped) => {
                            return Err(Error::Connection("client stopped".to_string()));
                        }
                    }
                }
            }
        }
    }

    fn spawn_loops(self: &Arc<Self>, transport: Transport) -> LiveConnection {
        let Transport { sink, stream } = transport;
        let lifeline = Lifeline {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            closed: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        };
        let sink = Arc::new(Mutex::new(sink));

        let mut tasks = vec![tokio::spawn(listen_loop(
            Arc::downgrade(self),
            stream,
            lifeline.clone(),
        ))];
        if !self.heartbeat_interval.is_zero() {
            tasks.push(tokio::spawn(heartbeat_loop(
                Arc::downgrade(self),
                sink.clone(),
                self.heartbeat_interval,
                lifeline.clone(),
            )));
        }

        LiveConnection {
            lifeline,
            sink,
            tasks,
        }
    }

    async fn dispatch(&self, text: &str) {
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        let handlers = self.handlers.read().await.clone();
        for handler in handlers {
            handler.handle(payload.clone()).await;
        }
    }

    /// Called by either loop when it ends on its own
    fn connection_lost(self: &Arc<Self>, lifeline: &Lifeline) {
        lifeline.closed.store(true, Ordering::Release);
        if lifeline.cancel.is_cancelled() || self.is_stopped() {
            return;
        }
        // Retire the sibling loop before replacing the connection
        lifeline.cancel.cancel();

        let inner = self.clone();
        let id = lifeline.id;
        tokio::spawn(async move {
            if let Err(e) = inner.open_connection(Reopen::Replace(id)).await {
                tracing::debug!(error = %e, "Reconnect abandoned");
            }
        });
    }
}

async fn listen_loop(inner: Weak<Inner>, mut stream: WsStream, lifeline: Lifeline) {
    loop {
        let frame = tokio::select! {
            _ = lifeline.cancel.cancelled() => return,
            frame = stream.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::debug!("Dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(connection_id = lifeline.id, ?frame, "WebSocket closed by peer");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(connection_id = lifeline.id, error = %e, "WebSocket read failed");
                break;
            }
            None => {
                tracing::info!(connection_id = lifeline.id, "WebSocket stream ended");
                break;
            }
        };

        match inner.upgrade() {
            Some(inner) => inner.dispatch(&text).await,
            None => return,
        }
    }

    if let Some(inner) = inner.upgrade() {
        inner.connection_lost(&lifeline);
    }
}

async fn heartbeat_loop(
    inner: Weak<Inner>,
    sink: Arc<Mutex<WsSink>>,
    interval: Duration,
    lifeline: Lifeline,
) {
    loop {
        tokio::select! {
            _ = lifeline.cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let ping = async { sink.lock().await.send(Message::Ping(Vec::new())).await };
        let result = tokio::select! {
            _ = lifeline.cancel.cancelled() => return,
            result = ping => result,
        };
        if let Err(e) = result {
            tracing::warn!(connection_id = lifeline.id, error = %e, "Heartbeat failed");
            break;
        }
        tracing::trace!(connection_id = lifeline.id, "Heartbeat sent");
    }

    if let Some(inner) = inner.upgrade() {
        inner.connection_lost(&lifeline);
    }
}
