//! Frame reader for parsing protocol messages from a stream

use std::io;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::timeout;

use super::error::FrameError;
use super::frame::RawFrame;
use super::index::CommandIndex;
use super::limits::{is_known_message_type, max_payload_for_type};
use super::{
    DELIMITER, MAGIC, MAX_INDEX_DIGITS, MAX_PAYLOAD_LENGTH, MAX_PAYLOAD_LENGTH_DIGITS,
    MAX_TYPE_LENGTH, MAX_TYPE_LENGTH_DIGITS, TERMINATOR,
};

/// Default timeout for completing a frame once the first byte is received
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// Default idle timeout when no idling is allowed (waiting for first byte)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame header information returned by `read_frame_header()`
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// The message type (e.g., "Command", "Remerge")
    pub message_type: String,
    /// The correlation index
    pub index: CommandIndex,
    /// The payload length in bytes
    pub payload_length: u64,
}

/// Reads protocol frames from an async reader
pub struct FrameReader<R> {
    reader: R,
}

impl<R> FrameReader<R> {
    /// Create a new frame reader
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Get a mutable reference to the underlying reader
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consume the frame reader and return the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: AsyncReadExt + Unpin> FrameReader<R> {
    /// Read the next frame from the stream
    ///
    /// Returns `Ok(None)` if the connection is cleanly closed.
    ///
    /// This method has no timeout. Prefer
    /// [`read_frame_with_timeout`](Self::read_frame_with_timeout) on live
    /// connections.
    pub async fn read_frame(&mut self) -> Result<Option<RawFrame>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };

        self.read_frame_after_first_byte(first_byte).await
    }

    /// Read the next frame, waiting indefinitely for the first byte
    ///
    /// Once the first byte arrives the rest of the frame must complete within
    /// `frame_timeout`.
    ///
    /// Returns `Ok(None)` if the connection is cleanly closed.
    pub async fn read_frame_with_timeout(
        &mut self,
        frame_timeout: Duration,
    ) -> Result<Option<RawFrame>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };

        match timeout(frame_timeout, self.read_frame_after_first_byte(first_byte)).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::FrameTimeout),
        }
    }

    /// Read the next frame with a bounded wait for the first byte
    ///
    /// Returns `Err(FrameError::IdleTimeout)` when nothing arrives within
    /// `idle_timeout`. No bytes are consumed in that case, so the caller may
    /// simply call again to keep waiting.
    pub async fn read_frame_with_full_timeout(
        &mut self,
        idle_timeout: Duration,
        frame_timeout: Duration,
    ) -> Result<Option<RawFrame>, FrameError> {
        let first_byte = match timeout(idle_timeout, self.read_byte_allow_eof()).await {
            Ok(Ok(Some(b))) => b,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(FrameError::IdleTimeout),
        };

        match timeout(frame_timeout, self.read_frame_after_first_byte(first_byte)).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::FrameTimeout),
        }
    }

    /// Read just the frame header, leaving the payload unread
    ///
    /// Returns `Ok(None)` if the connection is cleanly closed.
    pub async fn read_frame_header(&mut self) -> Result<Option<FrameHeader>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };

        self.read_frame_header_after_first_byte(first_byte)
            .await
            .map(Some)
    }

    /// Read the payload into a Vec after reading the header
    pub async fn read_payload_into_vec(
        &mut self,
        header: &FrameHeader,
    ) -> Result<Vec<u8>, FrameError> {
        let mut payload = vec![0u8; header.payload_length as usize];
        self.reader.read_exact(&mut payload).await?;

        let terminator = self.read_byte().await?;
        if terminator != TERMINATOR {
            return Err(FrameError::MissingTerminator);
        }

        Ok(payload)
    }

    /// Read the frame header after the first byte has been received
    async fn read_frame_header_after_first_byte(
        &mut self,
        first_byte: u8,
    ) -> Result<FrameHeader, FrameError> {
        // Magic
        if first_byte != MAGIC[0] {
            return Err(FrameError::InvalidMagic);
        }
        if self.read_byte().await? != MAGIC[1] {
            return Err(FrameError::InvalidMagic);
        }
        if self.read_byte().await? != DELIMITER {
            return Err(FrameError::MissingDelimiter);
        }

        // Type
        let type_length = self
            .read_digit_field(
                MAX_TYPE_LENGTH_DIGITS,
                FrameError::InvalidTypeLength,
                FrameError::TypeLengthTooManyDigits,
            )
            .await?;
        if type_length == 0 || type_length > MAX_TYPE_LENGTH as u64 {
            return Err(FrameError::TypeLengthOutOfRange);
        }

        let mut type_bytes = vec![0u8; type_length as usize];
        self.reader.read_exact(&mut type_bytes).await?;
        let message_type = String::from_utf8(type_bytes)
            .map_err(|_| FrameError::UnknownMessageType("<invalid utf8>".to_string()))?;

        // Reject unknown message types before touching the payload
        if !is_known_message_type(&message_type) {
            return Err(FrameError::UnknownMessageType(message_type));
        }

        if self.read_byte().await? != DELIMITER {
            return Err(FrameError::MissingDelimiter);
        }

        // Index
        let index = self
            .read_digit_field(
                MAX_INDEX_DIGITS,
                FrameError::InvalidIndex,
                FrameError::IndexTooManyDigits,
            )
            .await?;

        // Payload length
        let payload_length = self
            .read_digit_field(
                MAX_PAYLOAD_LENGTH_DIGITS,
                FrameError::InvalidPayloadLength,
                FrameError::PayloadLengthTooManyDigits,
            )
            .await?;
        if payload_length > MAX_PAYLOAD_LENGTH {
            return Err(FrameError::PayloadLengthExceedsMax {
                length: payload_length,
                max: MAX_PAYLOAD_LENGTH,
            });
        }
        let max_for_type = max_payload_for_type(&message_type);
        if max_for_type > 0 && payload_length > max_for_type {
            return Err(FrameError::PayloadLengthExceedsTypeMax {
                message_type,
                length: payload_length,
                max: max_for_type,
            });
        }

        Ok(FrameHeader {
            message_type,
            index: CommandIndex::new(index),
            payload_length,
        })
    }

    /// Complete reading a frame after the first byte has been received
    async fn read_frame_after_first_byte(
        &mut self,
        first_byte: u8,
    ) -> Result<Option<RawFrame>, FrameError> {
        let header = self.read_frame_header_after_first_byte(first_byte).await?;
        let payload = self.read_payload_into_vec(&header).await?;

        Ok(Some(RawFrame::new(
            header.index,
            header.message_type,
            payload,
        )))
    }

    /// Read a single byte, returning None on clean EOF
    async fn read_byte_allow_eof(&mut self) -> Result<Option<u8>, FrameError> {
        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf).await {
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a single byte
    async fn read_byte(&mut self) -> Result<u8, FrameError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf).await?;
        Ok(buf[0])
    }

    /// Read a decimal field terminated by the delimiter
    async fn read_digit_field(
        &mut self,
        max_digits: usize,
        invalid_err: FrameError,
        too_many_err: FrameError,
    ) -> Result<u64, FrameError> {
        let mut digits = Vec::with_capacity(max_digits);

        for _ in 0..=max_digits {
            let byte = self.read_byte().await?;

            if byte == DELIMITER {
                if digits.is_empty() {
                    return Err(invalid_err);
                }
                let s = std::str::from_utf8(&digits).map_err(|_| invalid_err.clone())?;
                return s.parse().map_err(|_| invalid_err.clone());
            }

            if !byte.is_ascii_digit() {
                return Err(invalid_err);
            }

            digits.push(byte);
        }

        Err(too_many_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::{AsyncWriteExt, BufReader};

    fn reader_for(data: &[u8]) -> FrameReader<BufReader<Cursor<Vec<u8>>>> {
        FrameReader::new(BufReader::new(Cursor::new(data.to_vec())))
    }

    #[tokio::test]
    async fn test_frame_reader_valid_frame() {
        let mut reader = reader_for(b"SL|7|Command|12|25|{\"name\":\"ping\",\"args\":\"\"}\n");
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.message_type, "Command");
        assert_eq!(frame.index, CommandIndex::new(12));
        assert_eq!(frame.payload, b"{\"name\":\"ping\",\"args\":\"\"}");
    }

    #[tokio::test]
    async fn test_frame_reader_empty_payload() {
        let mut reader = reader_for(b"SL|3|Ack|5|0|\n");
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.message_type, "Ack");
        assert_eq!(frame.index, CommandIndex::new(5));
        assert!(frame.payload.is_empty());
    }

    #[tokio::test]
    async fn test_frame_reader_multiple_frames() {
        let mut reader = reader_for(b"SL|3|Ack|1|2|{}\nSL|10|DiskStatus|0|2|{}\n");

        let first = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(first.message_type, "Ack");

        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(second.message_type, "DiskStatus");
        assert!(second.index.is_unsolicited());

        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_reader_connection_closed() {
        let mut reader = reader_for(b"");
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_reader_invalid_magic() {
        let mut reader = reader_for(b"NX|3|Ack|1|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::InvalidMagic)));
    }

    #[tokio::test]
    async fn test_frame_reader_invalid_index() {
        let mut reader = reader_for(b"SL|3|Ack|1x|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::InvalidIndex)));
    }

    #[tokio::test]
    async fn test_frame_reader_index_overflow() {
        // 20 digits but larger than u64::MAX
        let mut reader = reader_for(b"SL|3|Ack|99999999999999999999|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::InvalidIndex)));
    }

    #[tokio::test]
    async fn test_frame_reader_type_length_zero() {
        let mut reader = reader_for(b"SL|0||1|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::TypeLengthOutOfRange)));
    }

    #[tokio::test]
    async fn test_frame_reader_type_length_too_many_digits() {
        let mut reader = reader_for(b"SL|123|X|1|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::TypeLengthTooManyDigits)));
    }

    #[tokio::test]
    async fn test_frame_reader_rejects_unknown_type() {
        let mut reader = reader_for(b"SL|8|ChatSend|1|2|{}\n");
        let result = reader.read_frame().await;
        assert!(matches!(
            result,
            Err(FrameError::UnknownMessageType(t)) if t == "ChatSend"
        ));
    }

    #[tokio::test]
    async fn test_frame_reader_payload_exceeds_type_max() {
        let mut reader = reader_for(b"SL|3|Ack|1|2000|");
        let result = reader.read_frame().await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadLengthExceedsTypeMax { length: 2000, .. })
        ));
    }

    #[tokio::test]
    async fn test_frame_reader_payload_exceeds_global_max() {
        let mut reader = reader_for(b"SL|7|Remerge|0|999999999999|");
        let result = reader.read_frame().await;
        assert!(matches!(
            result,
            Err(FrameError::PayloadLengthExceedsMax { .. })
        ));
    }

    #[tokio::test]
    async fn test_frame_reader_wrong_terminator() {
        let mut reader = reader_for(b"SL|3|Ack|1|2|{} ");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::MissingTerminator)));
    }

    #[tokio::test]
    async fn test_frame_reader_eof_before_terminator() {
        let mut reader = reader_for(b"SL|3|Ack|1|2|{}");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_frame_reader_eof_mid_payload() {
        let mut reader = reader_for(b"SL|3|Ack|1|10|short");
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_frame_reader_with_timeout_frame_timeout() {
        let (client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server);

        let writer = tokio::spawn(async move {
            let mut client = client;
            client.write_all(b"SL|3|Ack").await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            client
        });

        let result = reader
            .read_frame_with_timeout(Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(FrameError::FrameTimeout)));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_frame_reader_full_timeout_idle() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server);

        let result = reader
            .read_frame_with_full_timeout(Duration::from_millis(20), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(FrameError::IdleTimeout)));
    }

    #[tokio::test]
    async fn test_frame_reader_idle_timeout_then_frame() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server);

        let result = reader
            .read_frame_with_full_timeout(Duration::from_millis(20), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(FrameError::IdleTimeout)));

        client.write_all(b"SL|3|Ack|4|0|\n").await.unwrap();
        let frame = reader
            .read_frame_with_full_timeout(Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.index, CommandIndex::new(4));
    }

    #[tokio::test]
    async fn test_read_frame_header_then_payload() {
        let mut reader = reader_for(b"SL|8|Checksum|9|2|{}\n");
        let header = reader.read_frame_header().await.unwrap().unwrap();
        assert_eq!(header.message_type, "Checksum");
        assert_eq!(header.payload_length, 2);
        let payload = reader.read_payload_into_vec(&header).await.unwrap();
        assert_eq!(payload, b"{}");
    }
}
