//! Connect handler - registers an active (connect-out) transfer
//!
//! Nothing connects yet; the socket is opened when `send`/`receive` runs.

use super::{HandlerContext, HandlerError, HandlerResult, parse_flag};
use crate::connection::{ActiveConnection, Connection, ConnectionError, TlsRole};

/// `<host:port>,<tls>[,<clientHandshake>]`
pub async fn handle_connect(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let mut fields = args.split(',');
    let address = fields.next().unwrap_or_default().trim();
    if address.is_empty() {
        return Err(HandlerError::invalid("connect", "missing address"));
    }
    let encrypted = match fields.next() {
        Some(flag) => parse_flag("connect", flag)?,
        None => false,
    };
    let client_handshake = match fields.next() {
        Some(flag) => parse_flag("connect", flag)?,
        None => false,
    };

    let role = TlsRole::for_channel(encrypted, client_handshake);
    if role.is_some() && ctx.channels.tls.is_none() {
        return Err(ConnectionError::TlsUnavailable.into());
    }

    let target = tokio::net::lookup_host(address)
        .await
        .map_err(|_| ConnectionError::Resolve(address.to_string()))?
        .next()
        .ok_or_else(|| ConnectionError::Resolve(address.to_string()))?;

    let active = ActiveConnection::new(target, &ctx.channels, role);
    let handle = ctx.register_transfer(
        Connection::Active(active),
        target.port(),
        target.ip().to_string(),
    );
    tracing::debug!(%target, encrypted, "Registered active transfer");
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::TestSlave;
    use silo_common::ErrorKind;
    use silo_common::protocol::SlaveMessage;

    #[tokio::test]
    async fn test_connect_registers() {
        let slave = TestSlave::new(1);
        let Some(SlaveMessage::TransferHandle {
            address,
            port,
            transfer_index,
            status,
        }) = handle_connect(&slave.ctx, "127.0.0.1:4000,false").await.unwrap()
        else {
            panic!("expected a transfer handle");
        };

        assert_eq!(address, "127.0.0.1");
        assert_eq!(port, 4000);
        assert!(!status.finished);
        assert!(slave.ctx.registry.get(transfer_index).is_some());
    }

    #[tokio::test]
    async fn test_connect_tls_without_config() {
        let slave = TestSlave::new(1);
        let err = handle_connect(&slave.ctx, "127.0.0.1:4000,true")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(slave.ctx.registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_bad_args() {
        let slave = TestSlave::new(1);
        assert_eq!(
            handle_connect(&slave.ctx, "").await.unwrap_err().kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            handle_connect(&slave.ctx, "127.0.0.1:1,perhaps")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            handle_connect(&slave.ctx, "no-port-here,false")
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::Connection
        );
    }
}
