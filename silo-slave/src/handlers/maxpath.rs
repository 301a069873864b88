//! MaxPath handler - reports the longest path the slave accepts

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};

pub fn handle_maxpath(ctx: &HandlerContext) -> HandlerResult {
    Ok(Some(SlaveMessage::MaxPath {
        max: ctx.max_path_length,
    }))
}
