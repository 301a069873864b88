//! Data channel establishment
//!
//! A transfer's data channel is either *passive* (the slave listens and the
//! client connects in) or *active* (the slave connects out). Either way the
//! result is one connected stream, optionally wrapped in TLS. Establishment
//! is a plain future; callers race it against their cancellation token, so
//! an abort drops the pending accept/connect and closes the socket.

mod active;
mod passive;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use silo_common::ErrorKind;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::constants::ERR_TLS_UNAVAILABLE;
use crate::port_range::PortRange;
use crate::tls::{TlsContext, server_name};

pub use active::ActiveConnection;
pub use passive::PassiveConnection;

/// Byte stream carrying transfer data
pub trait DataStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DataStream for T {}

/// Boxed data stream (plain TCP or TLS over TCP)
pub type BoxedStream = Box<dyn DataStream>;

/// Data channel failures
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("timed out after {0:?} waiting for the data connection")]
    Timeout(Duration),

    #[error("data connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    #[error("{msg}", msg = ERR_TLS_UNAVAILABLE)]
    TlsUnavailable,

    #[error("cannot resolve {0}")]
    Resolve(String),
}

impl ConnectionError {
    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Connection
    }
}

/// Which side of the TLS handshake the slave plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsRole {
    Server,
    Client,
}

impl TlsRole {
    /// Role for an encrypted channel; `client_handshake` flips the default
    pub fn for_channel(encrypted: bool, client_handshake: bool) -> Option<Self> {
        match (encrypted, client_handshake) {
            (false, _) => None,
            (true, false) => Some(Self::Server),
            (true, true) => Some(Self::Client),
        }
    }
}

/// Settings shared by every data channel
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub tls: Option<Arc<TlsContext>>,
    pub port_range: PortRange,
    pub bind_ip: Option<IpAddr>,
    /// Socket buffer size (0 = OS default)
    pub buffer_size: usize,
    pub accept_timeout: Duration,
    pub connect_timeout: Duration,
}

/// A connected data channel
pub struct Established {
    pub stream: BoxedStream,
    pub peer: SocketAddr,
}

impl std::fmt::Debug for Established {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Established")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Pending data channel of either direction
#[derive(Debug)]
pub enum Connection {
    Active(ActiveConnection),
    Passive(PassiveConnection),
}

impl Connection {
    /// Accept or connect, then run the TLS handshake
    pub async fn establish(self) -> Result<Established, ConnectionError> {
        match self {
            Self::Active(active) => active.establish().await,
            Self::Passive(passive) => passive.establish().await,
        }
    }

    /// Local port of a passive listener
    pub fn local_port(&self) -> Option<u16> {
        match self {
            Self::Active(_) => None,
            Self::Passive(passive) => Some(passive.local_port()),
        }
    }
}

/// Apply per-stream options and the optional TLS handshake
///
/// The handshake must complete within `limit`.
async fn secure(
    stream: TcpStream,
    role: Option<TlsRole>,
    tls: Option<&TlsContext>,
    limit: Duration,
) -> Result<BoxedStream, ConnectionError> {
    stream.set_nodelay(true)?;

    let Some(role) = role else {
        return Ok(Box::new(stream));
    };
    let tls = tls.ok_or(ConnectionError::TlsUnavailable)?;

    let secured: BoxedStream = match role {
        TlsRole::Server => {
            let handshake = tls.acceptor().accept(stream);
            Box::new(bounded(handshake, limit).await?)
        }
        TlsRole::Client => {
            let handshake = tls.connector().connect(server_name(), stream);
            Box::new(bounded(handshake, limit).await?)
        }
    };
    Ok(secured)
}

async fn bounded<T>(
    handshake: impl Future<Output = io::Result<T>>,
    limit: Duration,
) -> Result<T, ConnectionError> {
    tokio::time::timeout(limit, handshake)
        .await
        .map_err(|_| ConnectionError::Timeout(limit))?
        .map_err(ConnectionError::Handshake)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_role() {
        assert_eq!(TlsRole::for_channel(false, true), None);
        assert_eq!(TlsRole::for_channel(true, false), Some(TlsRole::Server));
        assert_eq!(TlsRole::for_channel(true, true), Some(TlsRole::Client));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ConnectionError::TlsUnavailable.kind(), ErrorKind::Connection);
    }
}
