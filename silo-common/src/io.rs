//! I/O utilities for sending and receiving protocol messages
//!
//! This module is the bridge between the message types (`MasterMessage`,
//! `SlaveMessage`) and the wire format (framing).

use std::io;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::framing::{CommandIndex, FrameError, FrameReader, FrameWriter, RawFrame};
use crate::protocol::{MasterMessage, SlaveMessage};

// =============================================================================
// Error Conversion
// =============================================================================

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(msg) => io::Error::other(msg),
            FrameError::ConnectionClosed => {
                io::Error::new(io::ErrorKind::ConnectionReset, "connection closed")
            }
            FrameError::FrameTimeout | FrameError::IdleTimeout => {
                io::Error::new(io::ErrorKind::TimedOut, err.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

// =============================================================================
// Received Messages
// =============================================================================

/// A decoded message together with the index from its frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received<M> {
    pub index: CommandIndex,
    pub message: M,
}

// =============================================================================
// Message Sending
// =============================================================================

/// Send a `SlaveMessage` to the master
///
/// Use `CommandIndex::UNSOLICITED` for pushes that answer no command.
pub async fn send_slave_message<W>(
    writer: &mut FrameWriter<W>,
    index: CommandIndex,
    message: &SlaveMessage,
) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let frame = encode(index, slave_message_type(message), message)?;
    writer.write_frame(&frame).await
}

/// Send a `MasterMessage` to a slave
pub async fn send_master_message<W>(
    writer: &mut FrameWriter<W>,
    index: CommandIndex,
    message: &MasterMessage,
) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let frame = encode(index, master_message_type(message), message)?;
    writer.write_frame(&frame).await
}

/// Serialize a message into a frame
pub fn encode<T: Serialize>(
    index: CommandIndex,
    message_type: &str,
    message: &T,
) -> Result<RawFrame, FrameError> {
    let payload = serde_json::to_vec(message).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
    Ok(RawFrame::new(index, message_type.to_string(), payload))
}

// =============================================================================
// Message Receiving
// =============================================================================

/// Read a `MasterMessage` with a bounded wait for the first byte
///
/// Returns `Err(FrameError::IdleTimeout)` when the master stays silent for
/// `idle_timeout`; the connection is still usable afterwards.
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_master_message_with_timeout<R>(
    reader: &mut FrameReader<R>,
    idle_timeout: Duration,
    frame_timeout: Duration,
) -> Result<Option<Received<MasterMessage>>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let Some(frame) = reader
        .read_frame_with_full_timeout(idle_timeout, frame_timeout)
        .await?
    else {
        return Ok(None);
    };

    decode(frame, master_message_type).map(Some)
}

/// Read a `SlaveMessage` from the stream
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_slave_message<R>(
    reader: &mut FrameReader<R>,
) -> Result<Option<Received<SlaveMessage>>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let Some(frame) = reader.read_frame().await? else {
        return Ok(None);
    };

    decode(frame, slave_message_type).map(Some)
}

/// Read a `MasterMessage` from the stream
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_master_message<R>(
    reader: &mut FrameReader<R>,
) -> Result<Option<Received<MasterMessage>>, FrameError>
where
    R: AsyncReadExt + Unpin,
{
    let Some(frame) = reader.read_frame().await? else {
        return Ok(None);
    };

    decode(frame, master_message_type).map(Some)
}

/// Parse a raw frame, checking that the frame type matches the JSON tag
fn decode<M: DeserializeOwned>(
    frame: RawFrame,
    type_of: fn(&M) -> &'static str,
) -> Result<Received<M>, FrameError> {
    let message: M = serde_json::from_slice(&frame.payload)
        .map_err(|e| FrameError::InvalidJson(e.to_string()))?;

    let expected_type = type_of(&message);
    if frame.message_type != expected_type {
        return Err(FrameError::TypeMismatch {
            frame: frame.message_type,
            payload: expected_type.to_string(),
        });
    }

    Ok(Received {
        index: frame.index,
        message,
    })
}

// =============================================================================
// Message Type Helpers
// =============================================================================

/// Get the type name for a master message (matches enum variant name)
#[must_use]
pub fn master_message_type(message: &MasterMessage) -> &'static str {
    match message {
        MasterMessage::HandshakeResponse { .. } => "HandshakeResponse",
        MasterMessage::Command { .. } => "Command",
    }
}

/// Get the type name for a slave message (matches enum variant name)
#[must_use]
pub fn slave_message_type(message: &SlaveMessage) -> &'static str {
    match message {
        SlaveMessage::Handshake { .. } => "Handshake",
        SlaveMessage::Ack => "Ack",
        SlaveMessage::TransferHandle { .. } => "TransferHandle",
        SlaveMessage::DiskStatus { .. } => "DiskStatus",
        SlaveMessage::TransferStatus { .. } => "TransferStatus",
        SlaveMessage::Checksum { .. } => "Checksum",
        SlaveMessage::MaxPath { .. } => "MaxPath",
        SlaveMessage::Id3Tag { .. } => "Id3Tag",
        SlaveMessage::SfvFile { .. } => "SfvFile",
        SlaveMessage::SslCheck { .. } => "SslCheck",
        SlaveMessage::Remerge { .. } => "Remerge",
        SlaveMessage::Exception { .. } => "Exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::framing::is_known_message_type;
    use crate::protocol::DiskStatus;

    #[tokio::test]
    async fn test_send_and_read_master_command() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let command = MasterMessage::Command {
            name: "checksum".to_string(),
            args: "/a/b.bin".to_string(),
        };
        send_master_message(&mut writer, CommandIndex::new(11), &command)
            .await
            .unwrap();

        let received = read_master_message_with_timeout(
            &mut reader,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(received.index, CommandIndex::new(11));
        assert_eq!(received.message, command);
    }

    #[tokio::test]
    async fn test_send_and_read_slave_exception() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        let message = SlaveMessage::exception(ErrorKind::NotFound, "/x not found");
        send_slave_message(&mut writer, CommandIndex::new(3), &message)
            .await
            .unwrap();

        let received = read_slave_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(received.index, CommandIndex::new(3));
        assert_eq!(received.message, message);
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let payload = serde_json::to_vec(&SlaveMessage::Ack).unwrap();
        let frame = RawFrame::new(CommandIndex::new(1), "Checksum".to_string(), payload);

        let mut reader = FrameReader::new(std::io::Cursor::new(frame.to_bytes()));
        let result = read_slave_message(&mut reader).await;
        assert!(matches!(result, Err(FrameError::TypeMismatch { .. })));
    }

    #[test]
    fn test_every_slave_message_type_is_known() {
        let samples = [
            SlaveMessage::Ack,
            SlaveMessage::DiskStatus {
                status: DiskStatus {
                    available: 1,
                    capacity: 2,
                },
            },
            SlaveMessage::Checksum { checksum: 1 },
            SlaveMessage::MaxPath { max: 4096 },
            SlaveMessage::SslCheck { enabled: false },
            SlaveMessage::exception(ErrorKind::Internal, "x"),
        ];
        for message in &samples {
            assert!(is_known_message_type(slave_message_type(message)));
        }
        assert!(is_known_message_type("Remerge"));
        assert!(is_known_message_type("TransferHandle"));
    }

    #[test]
    fn test_frame_error_to_io_error() {
        let err: io::Error = FrameError::ConnectionClosed.into();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        let err: io::Error = FrameError::IdleTimeout.into();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
