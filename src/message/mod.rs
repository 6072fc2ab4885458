//! Backend message envelopes and routing

mod envelope;
mod router;

pub use envelope::{
    BackendEvent, Envelope, CREATE_TASK, SDK_MESSAGE, TASK_ACTION, TASK_STATUS_UPDATE,
    TASK_USER_MESSAGE,
};
pub use router::{MessageRouter, OutboundHandler};
