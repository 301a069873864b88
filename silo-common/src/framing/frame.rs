//! Raw frame representation

use super::index::CommandIndex;
use super::{DELIMITER, MAGIC, TERMINATOR};

/// A frame as it travels on the wire, payload still undecoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Correlation index (`0` for unsolicited messages)
    pub index: CommandIndex,
    /// Message type name
    pub message_type: String,
    /// JSON payload bytes
    pub payload: Vec<u8>,
}

impl RawFrame {
    /// Create a new frame
    pub fn new(index: CommandIndex, message_type: String, payload: Vec<u8>) -> Self {
        Self {
            index,
            message_type,
            payload,
        }
    }

    /// Serialize the frame into its wire form
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let type_len = self.message_type.len().to_string();
        let index = self.index.get().to_string();
        let payload_len = self.payload.len().to_string();

        let mut bytes = Vec::with_capacity(
            MAGIC.len()
                + type_len.len()
                + self.message_type.len()
                + index.len()
                + payload_len.len()
                + self.payload.len()
                + 6,
        );
        bytes.extend_from_slice(MAGIC);
        bytes.push(DELIMITER);
        bytes.extend_from_slice(type_len.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(self.message_type.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(index.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(payload_len.as_bytes());
        bytes.push(DELIMITER);
        bytes.extend_from_slice(&self.payload);
        bytes.push(TERMINATOR);
        bytes
    }
}
