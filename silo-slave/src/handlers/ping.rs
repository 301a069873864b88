//! Ping handler - liveness probe

use silo_common::protocol::SlaveMessage;

use super::HandlerResult;

/// Answer a ping
pub fn handle_ping() -> HandlerResult {
    Ok(Some(SlaveMessage::Ack))
}
