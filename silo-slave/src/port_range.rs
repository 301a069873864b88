//! Passive port allocation
//!
//! Passive transfers listen on a port from a configured window so the
//! firewall in front of a slave can stay narrow. Without a window the OS
//! picks an ephemeral port.

use std::io;
use std::net::{IpAddr, SocketAddr};

use rand::RngExt;
use silo_common::ErrorKind;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use thiserror::Error;
use tokio::net::TcpListener;

/// Listen backlog for passive sockets (one client is expected)
const PASSIVE_BACKLOG: i32 = 8;

/// Passive port allocation failures
#[derive(Debug, Error)]
pub enum PortRangeError {
    #[error("no free port in {from}-{to}")]
    Exhausted { from: u16, to: u16 },

    #[error("failed to open passive socket: {0}")]
    Io(#[from] io::Error),
}

impl PortRangeError {
    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Exhausted { .. } => ErrorKind::PortRangeExhausted,
            Self::Io(_) => ErrorKind::Connection,
        }
    }
}

/// Window of ports to listen on for passive transfers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    window: Option<(u16, u16)>,
    buffer_size: usize,
}

impl PortRange {
    /// Let the OS pick any free port
    pub fn any(buffer_size: usize) -> Self {
        Self {
            window: None,
            buffer_size,
        }
    }

    /// Restrict listeners to `from..=to`
    pub fn new(from: u16, to: u16, buffer_size: usize) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            window: Some((from, to)),
            buffer_size,
        }
    }

    /// Build from an optional window
    pub fn from_window(window: Option<(u16, u16)>, buffer_size: usize) -> Self {
        match window {
            Some((from, to)) => Self::new(from, to, buffer_size),
            None => Self::any(buffer_size),
        }
    }

    /// The configured window, if any
    pub fn window(&self) -> Option<(u16, u16)> {
        self.window
    }

    /// Bind a listening socket on `ip`
    ///
    /// Within a window, ports are tried from a random offset with wraparound.
    /// Ports that fail to bind are skipped; one exhausted pass is followed by
    /// exactly one more before giving up. Must be called from a Tokio runtime.
    pub fn listen(&self, ip: IpAddr) -> Result<TcpListener, PortRangeError> {
        let Some((from, to)) = self.window else {
            return Ok(self.bind(SocketAddr::new(ip, 0))?);
        };

        let span = u32::from(to - from) + 1;
        let offset = rand::rng().random::<u32>() % span;

        for pass in 0..2 {
            for step in 0..span {
                let port = from + ((offset + step) % span) as u16;
                match self.bind(SocketAddr::new(ip, port)) {
                    Ok(listener) => return Ok(listener),
                    Err(e) => {
                        tracing::trace!(port, pass, error = %e, "Passive port unavailable");
                    }
                }
            }
            tracing::debug!(from, to, pass, "Passive port window exhausted");
        }

        Err(PortRangeError::Exhausted { from, to })
    }

    fn bind(&self, addr: SocketAddr) -> io::Result<TcpListener> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

        #[cfg(unix)]
        socket.set_reuse_address(true)?;

        // Accepted sockets inherit the receive buffer from the listener.
        if self.buffer_size > 0 {
            socket.set_recv_buffer_size(self.buffer_size)?;
            socket.set_send_buffer_size(self.buffer_size)?;
        }

        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(PASSIVE_BACKLOG)?;

        TcpListener::from_std(socket.into())
    }
}
