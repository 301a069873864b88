//! Listen-then-accept data channels

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use super::{ChannelSettings, ConnectionError, Established, TlsRole, secure};
use crate::port_range::PortRangeError;
use crate::tls::TlsContext;

/// A bound listener waiting for exactly one client
#[derive(Debug)]
pub struct PassiveConnection {
    listener: TcpListener,
    local_port: u16,
    role: Option<TlsRole>,
    tls: Option<Arc<TlsContext>>,
    accept_timeout: Duration,
}

impl PassiveConnection {
    /// Bind a listener from the configured port window
    pub fn bind(settings: &ChannelSettings, role: Option<TlsRole>) -> Result<Self, PortRangeError> {
        let ip = settings
            .bind_ip
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let listener = settings.port_range.listen(ip)?;
        let local_port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            local_port,
            role,
            tls: settings.tls.clone(),
            accept_timeout: settings.accept_timeout,
        })
    }

    /// Port the client should connect to
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Accept one client within the timeout; the listener closes afterwards
    pub async fn establish(self) -> Result<Established, ConnectionError> {
        let (stream, peer) = tokio::time::timeout(self.accept_timeout, self.listener.accept())
            .await
            .map_err(|_| ConnectionError::Timeout(self.accept_timeout))??;
        drop(self.listener);

        tracing::debug!(%peer, port = self.local_port, "Accepted data connection");
        let stream = secure(stream, self.role, self.tls.as_deref(), self.accept_timeout).await?;
        Ok(Established { stream, peer })
    }
}
