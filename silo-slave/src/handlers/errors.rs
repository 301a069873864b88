//! Handler failures and their mapping to error kinds
//!
//! Every error a handler returns reaches the master as an `Exception` with
//! the command's index; none of them end the control connection.

use std::io;

use silo_common::ErrorKind;
use silo_common::protocol::TransferIndex;
use thiserror::Error;
use tokio::task::JoinError;

use crate::connection::ConnectionError;
use crate::constants::{ERR_TRANSFER_NOT_FOUND, ERR_UNSUPPORTED_COMMAND};
use crate::files::{FileError, PathError};
use crate::port_range::PortRangeError;
use crate::transfers::TransferError;

/// Why a command failed
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}{suffix}", suffix = ERR_UNSUPPORTED_COMMAND)]
    Unsupported(String),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArgs {
        command: &'static str,
        reason: String,
    },

    #[error(transparent)]
    File(#[from] FileError),

    #[error("{prefix}{0}", prefix = ERR_TRANSFER_NOT_FOUND)]
    TransferNotFound(TransferIndex),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    PortRange(#[from] PortRangeError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("a remerge is already running")]
    AlreadyRemerging,

    #[error("{0}")]
    Fault(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("handler task failed: {0}")]
    Join(#[from] JoinError),
}

impl From<PathError> for HandlerError {
    fn from(e: PathError) -> Self {
        Self::File(FileError::Path(e))
    }
}

impl HandlerError {
    /// Build an argument error for `command`
    pub fn invalid(command: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            command,
            reason: reason.into(),
        }
    }

    /// Error kind reported to the master
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::InvalidArgs { .. } => ErrorKind::Invalid,
            Self::File(e) => e.kind(),
            Self::TransferNotFound(_) => ErrorKind::TransferNotFound,
            Self::Transfer(e) => e.kind(),
            Self::PortRange(e) => e.kind(),
            Self::Connection(e) => e.kind(),
            Self::AlreadyRemerging => ErrorKind::AlreadyRemerging,
            Self::Io(_) => ErrorKind::IoError,
            Self::Fault(_) | Self::Join(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_message() {
        let err = HandlerError::Unsupported("frobnicate".into());
        assert_eq!(err.to_string(), "frobnicate - Operation Not Supported");
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            HandlerError::TransferNotFound(TransferIndex::new(3)).kind(),
            ErrorKind::TransferNotFound
        );
        assert_eq!(
            HandlerError::from(PathError::Empty).kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            HandlerError::PortRange(PortRangeError::Exhausted { from: 1, to: 2 }).kind(),
            ErrorKind::PortRangeExhausted
        );
        assert_eq!(HandlerError::AlreadyRemerging.kind(), ErrorKind::AlreadyRemerging);
        assert_eq!(HandlerError::Fault("boom").kind(), ErrorKind::Internal);
    }
}
