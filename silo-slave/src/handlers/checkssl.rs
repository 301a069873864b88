//! CheckSsl handler - reports whether data channels can use TLS

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};

pub fn handle_checkssl(ctx: &HandlerContext) -> HandlerResult {
    Ok(Some(SlaveMessage::SslCheck {
        enabled: ctx.channels.tls.is_some(),
    }))
}
