//! Type definitions for the transfer engine

use std::fmt;
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use ipnet::IpNet;
use silo_common::protocol::{FailureInfo, TransferIndex};
use silo_common::{ErrorKind, TRANSFER_TYPE_ASCII, TRANSFER_TYPE_BINARY};
use thiserror::Error;

use crate::config::Config;
use crate::connection::ConnectionError;
use crate::constants::{ERR_PEER_DENIED, ERR_TOO_SLOW, MIN_TRANSFER_BUFFER};
use crate::roots::RootError;

/// Direction of a transfer, from the slave's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Created but not yet started
    Unknown,
    /// Client sending a file to the slave
    Receiving,
    /// Slave sending a file to the client
    Sending,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Receiving => write!(f, "upload"),
            Self::Sending => write!(f, "download"),
        }
    }
}

/// Binary or ASCII data representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Binary,
    Ascii,
}

impl TransferType {
    /// Parse the single type character from a command
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            TRANSFER_TYPE_BINARY => Some(Self::Binary),
            TRANSFER_TYPE_ASCII => Some(Self::Ascii),
            _ => None,
        }
    }
}

/// Everything a `send` or `receive` command asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub transfer_type: TransferType,
    pub offset: u64,
    pub transfer_index: TransferIndex,
    /// Minimum bytes per second (0 = no floor)
    pub min_speed: u64,
    /// Maximum bytes per second (0 = unlimited)
    pub max_speed: u64,
    /// Addresses allowed to open the data connection
    pub peer: Option<IpNet>,
    /// Path relative to every root
    pub path: PathBuf,
}

/// Transfer knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct TransferPolicy {
    pub buffer_size: usize,
    pub status_interval: Duration,
    pub min_speed_grace: Duration,
    pub min_speed_interval: Duration,
    pub upload_poll: Duration,
    pub upload_checksums: bool,
    pub download_checksums: bool,
}

impl TransferPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_size: config.slave.buffer_size.max(MIN_TRANSFER_BUFFER),
            status_interval: config.transfers.status_interval(),
            min_speed_grace: config.transfers.min_speed_grace(),
            min_speed_interval: config.transfers.min_speed_interval(),
            upload_poll: config.transfers.upload_poll(),
            upload_checksums: config.checksums.upload,
            download_checksums: config.checksums.download,
        }
    }
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Ways a transfer can fail
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Aborted(String),

    #[error("{prefix}{speed} B/s, minimum {min} B/s", prefix = ERR_TOO_SLOW)]
    Slow { speed: u64, min: u64 },

    #[error("{prefix}{0}", prefix = ERR_PEER_DENIED)]
    Denied(IpAddr),

    #[error("{0} already exists")]
    Exists(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Placement(#[from] RootError),

    #[error("transfer I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("transfer {0} already started")]
    AlreadyStarted(TransferIndex),
}

impl TransferError {
    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Aborted(_) => ErrorKind::TransferAborted,
            Self::Slow { .. } => ErrorKind::TransferSlow,
            Self::Denied(_) => ErrorKind::TransferDenied,
            Self::Exists(_) => ErrorKind::Exists,
            Self::Connection(e) => e.kind(),
            Self::Placement(e) => e.kind(),
            Self::Io(_) => ErrorKind::TransferFailed,
            Self::Invalid(_) | Self::AlreadyStarted(_) => ErrorKind::Invalid,
        }
    }

    /// Failure payload for a terminal status
    pub fn to_failure(&self) -> FailureInfo {
        FailureInfo::new(self.kind(), self.to_string())
    }
}
