//! Tool facade exposed to the external agent
//!
//! - `server`: the four task tools over the session store and backend
//! - `types`: argument, result and descriptor types
//! - `stdio`: newline-delimited JSON transport for the tools

mod server;
pub mod stdio;
mod types;

pub use server::ToolServer;
pub use types::{
    AckMessagesArgs, AckMessagesResult, AckStatus, CreateTaskSessionArgs,
    CreateTaskSessionResult, MessageView, ReceiveMessagesArgs, ReceiveMessagesResult,
    SendMessageArgs, SendMessageResult, ToolDescriptor, ToolName, DEFAULT_RECEIVE_LIMIT,
};
