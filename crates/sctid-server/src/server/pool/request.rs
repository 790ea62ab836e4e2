use crate::server::{error::Result, protocol::{Command, Payload}};
use sctid::Principal;
use tokio::sync::oneshot;

/// A message processed by a worker task.
#[derive(Debug)]
pub enum WorkRequest {
    /// Run `command` on behalf of `principal` and send the result back.
    Execute {
        principal: Principal,
        command: Command,
        response: oneshot::Sender<Result<Payload>>,
    },
    /// Stop the worker after acknowledging.
    Shutdown { response: oneshot::Sender<()> },
}
