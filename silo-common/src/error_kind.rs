//! Machine-readable error kinds for slave failures
//!
//! These kinds travel in `Exception` responses and in failed transfer
//! statuses, letting the master react to the class of failure (pick another
//! slave, retry the upload elsewhere, mark the file missing) without parsing
//! message text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classes of failure a slave reports to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No root can accept a new file
    NoAvailableRoot,

    /// Destination file or directory already exists
    Exists,

    /// The operating system refused the operation
    Permission,

    /// The requested path is not present in any root
    NotFound,

    /// The transfer index was never created by `connect`/`listen`
    TransferNotFound,

    /// The data transfer failed with an I/O error
    TransferFailed,

    /// The transfer was aborted on request
    TransferAborted,

    /// The transfer fell below its minimum speed
    TransferSlow,

    /// The data connection came from an unexpected address
    TransferDenied,

    /// The command name is not known to this slave
    Unsupported,

    /// The command arguments could not be parsed
    Invalid,

    /// A data channel could not be established
    Connection,

    /// Every port in the passive window is in use
    PortRangeExhausted,

    /// A remerge is already running
    AlreadyRemerging,

    /// Generic filesystem error
    IoError,

    /// Unclassified failure
    Internal,
}

impl ErrorKind {
    /// Convert to the string representation used in protocol messages
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAvailableRoot => "no_available_root",
            Self::Exists => "exists",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::TransferNotFound => "transfer_not_found",
            Self::TransferFailed => "transfer_failed",
            Self::TransferAborted => "transfer_aborted",
            Self::TransferSlow => "transfer_slow",
            Self::TransferDenied => "transfer_denied",
            Self::Unsupported => "unsupported",
            Self::Invalid => "invalid",
            Self::Connection => "connection",
            Self::PortRangeExhausted => "port_range_exhausted",
            Self::AlreadyRemerging => "already_remerging",
            Self::IoError => "io_error",
            Self::Internal => "internal",
        }
    }

    /// Parse from string (for master-side handling)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_available_root" => Some(Self::NoAvailableRoot),
            "exists" => Some(Self::Exists),
            "permission" => Some(Self::Permission),
            "not_found" => Some(Self::NotFound),
            "transfer_not_found" => Some(Self::TransferNotFound),
            "transfer_failed" => Some(Self::TransferFailed),
            "transfer_aborted" => Some(Self::TransferAborted),
            "transfer_slow" => Some(Self::TransferSlow),
            "transfer_denied" => Some(Self::TransferDenied),
            "unsupported" => Some(Self::Unsupported),
            "invalid" => Some(Self::Invalid),
            "connection" => Some(Self::Connection),
            "port_range_exhausted" => Some(Self::PortRangeExhausted),
            "already_remerging" => Some(Self::AlreadyRemerging),
            "io_error" => Some(Self::IoError),
            "internal" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether this kind describes a failed data transfer
    #[must_use]
    pub fn is_transfer_failure(&self) -> bool {
        matches!(
            self,
            Self::TransferFailed | Self::TransferAborted | Self::TransferSlow | Self::TransferDenied
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorKind> for String {
    fn from(kind: ErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str() {
        assert_eq!(ErrorKind::Exists.as_str(), "exists");
        assert_eq!(ErrorKind::NoAvailableRoot.as_str(), "no_available_root");
        assert_eq!(ErrorKind::TransferSlow.as_str(), "transfer_slow");
        assert_eq!(
            ErrorKind::PortRangeExhausted.as_str(),
            "port_range_exhausted"
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!(ErrorKind::parse("exists"), Some(ErrorKind::Exists));
        assert_eq!(
            ErrorKind::parse("transfer_not_found"),
            Some(ErrorKind::TransferNotFound)
        );
        assert_eq!(ErrorKind::parse("unknown"), None);
        assert_eq!(ErrorKind::parse(""), None);
    }

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&ErrorKind::AlreadyRemerging).unwrap();
        assert_eq!(json, "\"already_remerging\"");
        let parsed: ErrorKind = serde_json::from_str("\"transfer_denied\"").unwrap();
        assert_eq!(parsed, ErrorKind::TransferDenied);
    }

    #[test]
    fn test_transfer_failure_classes() {
        assert!(ErrorKind::TransferSlow.is_transfer_failure());
        assert!(ErrorKind::TransferAborted.is_transfer_failure());
        assert!(!ErrorKind::Exists.is_transfer_failure());
        assert!(!ErrorKind::Unsupported.is_transfer_failure());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ErrorKind::Permission), "permission");
        let s: String = ErrorKind::NotFound.into();
        assert_eq!(s, "not_found");
    }
}
