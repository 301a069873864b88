//! Frame-level errors

use std::io;

use thiserror::Error;

/// Errors produced while reading or writing frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid frame magic")]
    InvalidMagic,

    #[error("invalid type length field")]
    InvalidTypeLength,

    #[error("type length field has too many digits")]
    TypeLengthTooManyDigits,

    #[error("type length out of range")]
    TypeLengthOutOfRange,

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("invalid index field")]
    InvalidIndex,

    #[error("index field has too many digits")]
    IndexTooManyDigits,

    #[error("invalid payload length field")]
    InvalidPayloadLength,

    #[error("payload length field has too many digits")]
    PayloadLengthTooManyDigits,

    #[error("payload length {length} exceeds global maximum {max}")]
    PayloadLengthExceedsMax { length: u64, max: u64 },

    #[error("payload length {length} exceeds maximum {max} for {message_type}")]
    PayloadLengthExceedsTypeMax {
        message_type: String,
        length: u64,
        max: u64,
    },

    #[error("missing delimiter")]
    MissingDelimiter,

    #[error("missing frame terminator")]
    MissingTerminator,

    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("frame type mismatch: frame says '{frame}' but payload is '{payload}'")]
    TypeMismatch { frame: String, payload: String },

    #[error("frame did not complete in time")]
    FrameTimeout,

    #[error("no data received in time")]
    IdleTimeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::ConnectionClosed
        } else {
            FrameError::Io(err.to_string())
        }
    }
}

impl FrameError {
    /// Whether this error means the peer went away rather than sent garbage
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed | FrameError::Io(_))
    }
}
