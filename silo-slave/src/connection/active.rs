//! Connect-out data channels

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpSocket;

use super::{ChannelSettings, ConnectionError, Established, TlsRole, secure};
use crate::tls::TlsContext;

/// A connection the slave will open to a client
#[derive(Debug)]
pub struct ActiveConnection {
    target: SocketAddr,
    bind_ip: Option<IpAddr>,
    buffer_size: usize,
    role: Option<TlsRole>,
    tls: Option<Arc<TlsContext>>,
    connect_timeout: Duration,
}

impl ActiveConnection {
    pub fn new(target: SocketAddr, settings: &ChannelSettings, role: Option<TlsRole>) -> Self {
        Self {
            target,
            bind_ip: settings.bind_ip,
            buffer_size: settings.buffer_size,
            role,
            tls: settings.tls.clone(),
            connect_timeout: settings.connect_timeout,
        }
    }

    /// Address the slave connects to
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Connect within the timeout, then run the TLS handshake
    pub async fn establish(self) -> Result<Established, ConnectionError> {
        let socket = if self.target.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        if self.buffer_size > 0 {
            let size = u32::try_from(self.buffer_size).unwrap_or(u32::MAX);
            socket.set_recv_buffer_size(size)?;
            socket.set_send_buffer_size(size)?;
        }

        if let Some(ip) = self.bind_ip
            && ip.is_ipv4() == self.target.is_ipv4()
        {
            socket.bind(SocketAddr::new(ip, 0))?;
        }

        let stream = tokio::time::timeout(self.connect_timeout, socket.connect(self.target))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))??;

        tracing::debug!(peer = %self.target, "Connected data channel");
        let stream = secure(stream, self.role, self.tls.as_deref(), self.connect_timeout).await?;
        Ok(Established {
            stream,
            peer: self.target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port_range::PortRange;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn settings() -> ChannelSettings {
        ChannelSettings {
            tls: None,
            port_range: PortRange::any(0),
            bind_ip: None,
            buffer_size: 128 * 1024,
            accept_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_connects_out() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 3];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut established = ActiveConnection::new(addr, &settings(), None)
            .establish()
            .await
            .unwrap();
        established.stream.write_all(b"abc").await.unwrap();
        established.stream.flush().await.unwrap();

        assert_eq!(&server.await.unwrap(), b"abc");
        assert_eq!(established.peer, addr);
    }

    #[tokio::test]
    async fn test_refused() {
        let port = {
            let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);

        let result = ActiveConnection::new(addr, &settings(), None)
            .establish()
            .await;
        assert!(matches!(result, Err(ConnectionError::Io(_))));
    }
}
