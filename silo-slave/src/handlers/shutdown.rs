//! Shutdown handler - acknowledge, then stop the slave

use silo_common::framing::CommandIndex;
use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};
use crate::constants::MSG_SHUTDOWN_COMMAND;

/// The ack is queued before the shutdown token fires, so the writer sends
/// it before the connection closes.
pub fn handle_shutdown(ctx: &HandlerContext, index: CommandIndex) -> HandlerResult {
    tracing::info!("{}", MSG_SHUTDOWN_COMMAND);
    ctx.reply(index, SlaveMessage::Ack);
    ctx.shutdown.cancel();
    Ok(None)
}
