//! Frame writer for sending protocol messages to a stream

use tokio::io::AsyncWriteExt;

use super::error::FrameError;
use super::frame::RawFrame;
use super::index::CommandIndex;

/// Writes protocol frames to an async writer
pub struct FrameWriter<W> {
    writer: W,
}

impl<W> FrameWriter<W> {
    /// Create a new frame writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get a mutable reference to the underlying writer
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Consume the frame writer and return the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: AsyncWriteExt + Unpin> FrameWriter<W> {
    /// Write a frame to the stream and flush it
    pub async fn write_frame(&mut self, frame: &RawFrame) -> Result<(), FrameError> {
        let bytes = frame.to_bytes();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Write a frame with the given components
    pub async fn write(
        &mut self,
        index: CommandIndex,
        message_type: &str,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        let frame = RawFrame::new(index, message_type.to_string(), payload.to_vec());
        self.write_frame(&frame).await
    }

    /// Shut down the write half of the stream
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_frame_writer() {
        let mut buffer = Vec::new();

        {
            let mut writer = FrameWriter::new(Cursor::new(&mut buffer));
            let frame = RawFrame::new(
                CommandIndex::new(3),
                "MaxPath".to_string(),
                b"{\"max\":4096}".to_vec(),
            );
            writer.write_frame(&frame).await.unwrap();
        }

        assert_eq!(buffer, b"SL|7|MaxPath|3|12|{\"max\":4096}\n");
    }

    #[tokio::test]
    async fn test_frame_writer_convenience_method() {
        let mut buffer = Vec::new();

        {
            let mut writer = FrameWriter::new(Cursor::new(&mut buffer));
            writer
                .write(CommandIndex::UNSOLICITED, "DiskStatus", b"{}")
                .await
                .unwrap();
        }

        assert_eq!(buffer, b"SL|10|DiskStatus|0|2|{}\n");
    }
}
