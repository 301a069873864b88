//! Protocol definitions for the slave control channel
//!
//! Every message is a JSON object tagged with `"type"` and carried in one
//! frame (see [`crate::framing`]). The command correlation index lives in the
//! frame header, not in these payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ErrorKind;

/// Identifies one transfer for its whole lifetime on a slave
///
/// Allocated by the slave when `connect` or `listen` creates the transfer and
/// never reused while that transfer is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferIndex(u64);

impl TransferIndex {
    /// Wrap a raw index
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a transfer or command failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Immutable snapshot of one transfer's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStatus {
    pub transfer_index: TransferIndex,
    /// Milliseconds since data started flowing (0 before that)
    pub elapsed_ms: u64,
    /// Bytes moved so far
    pub transferred: u64,
    /// Running CRC32 of the data, `0` when checksumming is disabled
    pub checksum: u32,
    /// Whether the transfer has reached a terminal state
    pub finished: bool,
    /// Failure carried by a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
}

impl TransferStatus {
    /// Terminal status for a transfer that failed before moving any data
    #[must_use]
    pub fn failed(transfer_index: TransferIndex, error: FailureInfo) -> Self {
        Self {
            transfer_index,
            elapsed_ms: 0,
            transferred: 0,
            checksum: 0,
            finished: true,
            error: Some(error),
        }
    }

    /// Observed throughput in bytes per second
    #[must_use]
    pub fn speed(&self) -> u64 {
        if self.elapsed_ms == 0 {
            return 0;
        }
        self.transferred.saturating_mul(1000) / self.elapsed_ms
    }

    /// Whether the transfer ended with a failure
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Live free/total space across all roots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskStatus {
    /// Bytes available for new files
    pub available: u64,
    /// Total bytes across all roots
    pub capacity: u64,
}

/// Minimal directory entry reported during remerge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightRemoteInode {
    pub name: String,
    pub is_dir: bool,
    /// File size in bytes (`0` for directories)
    pub length: u64,
    /// Modification time in milliseconds since the Unix epoch
    pub last_modified: u64,
}

/// ID3v1 tag fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Id3Tag {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: String,
    pub comment: String,
    /// Genre byte as stored in the tag
    pub genre: u8,
    /// Track number (ID3v1.1 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<u8>,
}

/// Messages sent by the master
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MasterMessage {
    /// Answer to the slave's handshake
    HandshakeResponse {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A command for the slave; arguments are parsed by the handler
    Command { name: String, args: String },
}

/// Messages sent by the slave
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SlaveMessage {
    /// First message on a new control connection
    Handshake { name: String, version: String },
    /// Command completed with nothing to report
    Ack,
    /// A transfer was created and is waiting for its data connection
    TransferHandle {
        address: String,
        port: u16,
        transfer_index: TransferIndex,
        status: TransferStatus,
    },
    /// Free and total space across all roots
    DiskStatus { status: DiskStatus },
    /// Progress or terminal status of a transfer
    TransferStatus { status: TransferStatus },
    /// CRC32 of a file
    Checksum { checksum: u32 },
    /// Longest path this slave accepts
    MaxPath { max: u32 },
    /// ID3v1 tag of a file
    Id3Tag { tag: Id3Tag },
    /// Parsed SFV file (file name to CRC32)
    SfvFile { entries: BTreeMap<String, u32> },
    /// Whether data channels can use TLS
    SslCheck { enabled: bool },
    /// Merged listing of one directory
    Remerge {
        path: String,
        entries: Vec<LightRemoteInode>,
        dir_mtime: u64,
    },
    /// Command failed
    Exception { kind: ErrorKind, message: String },
}

impl SlaveMessage {
    /// Build an exception response
    pub fn exception(kind: ErrorKind, message: impl Into<String>) -> Self {
        SlaveMessage::Exception {
            kind,
            message: message.into(),
        }
    }
}
