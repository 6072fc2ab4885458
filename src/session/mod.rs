//! Session management
//!
//! In-memory store of task conversations and their pending message queues.

mod manager;

pub use manager::{MessageRecord, Session, SessionManager, SessionStatus};
