//! Listen handler - binds a passive listener and registers the transfer

use super::{HandlerContext, HandlerError, HandlerResult, parse_flag};
use crate::connection::{Connection, ConnectionError, PassiveConnection, TlsRole};

/// `<tls>[,<clientHandshake>]`
pub fn handle_listen(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let mut fields = args.split(',').map(str::trim).filter(|f| !f.is_empty());
    let encrypted = fields
        .next()
        .map(|f| parse_flag("listen", f))
        .transpose()?
        .unwrap_or(false);
    let client_handshake = fields
        .next()
        .map(|f| parse_flag("listen", f))
        .transpose()?
        .unwrap_or(false);

    let role = TlsRole::for_channel(encrypted, client_handshake);
    if role.is_some() && ctx.channels.tls.is_none() {
        return Err(HandlerError::Connection(ConnectionError::TlsUnavailable));
    }

    let passive = PassiveConnection::bind(&ctx.channels, role)?;
    let port = passive.local_port();
    let handle = ctx.register_transfer(
        Connection::Passive(passive),
        port,
        ctx.advertised_ip.to_string(),
    );
    tracing::debug!(port, encrypted, "Registered passive transfer");
    Ok(Some(handle))
}
