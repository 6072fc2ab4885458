//! Conductor SDK - bridge external AI agents to the Conductor backend
//!
//! An agent talks to this crate through a small tool surface (create a
//! task, send a message, receive and acknowledge messages). The crate keeps
//! one persistent WebSocket connection to the backend and turns the
//! backend's event stream into an ordered, acknowledgeable message queue
//! per task.
//!
//! ## Architecture
//!
//! ```text
//!            agent (stdio NDJSON / library calls)
//!                         │
//!              ┌──────────▼──────────┐
//!              │     ToolServer      │── pop / ack ──┐
//!              └──────────┬──────────┘               │
//!                  create_task /                     │
//!                  sdk_message                       │
//!              ┌──────────▼──────────┐     ┌─────────▼─────────┐
//!              │    MessageRouter    │────▶│  SessionManager   │
//!              └──────────┬──────────┘     └───────────────────┘
//!                 outbound│▲ inbound
//!              ┌──────────▼┴─────────┐
//!              │      WsClient       │  reconnect + heartbeat
//!              └──────────┬──────────┘
//!                         │ wss://<backend>/ws/agent (Bearer token)
//!                  Conductor backend
//! ```
//!
//! ## Modules
//!
//! - [`session`]: per-task message queues with pop/ack
//! - [`message`]: wire envelopes and backend event routing
//! - [`ws`]: self-healing WebSocket client
//! - [`orchestrator`]: start/stop and inbound wiring
//! - [`tools`]: agent-facing tool facade and its stdio transport
//! - [`reporter`]: timestamped event emission
//! - [`backend`]: backend REST client
//! - [`context`]: git-aware view of the local workspace
//! - [`runtime`]: assembles all of the above from a config
//! - [`config`]: configuration management

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod reporter;
pub mod runtime;
pub mod session;
pub mod tools;
pub mod ws;

pub use config::ConductorConfig;
pub use error::{Error, Result};
