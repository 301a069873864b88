//! Wire framing for the slave control protocol
//!
//! Every message travels as one frame:
//!
//! ```text
//! SL|<type_len>|<type>|<index>|<payload_len>|<payload>\n
//! ```
//!
//! - `type` names the message kind and must be known to the receiver
//! - `index` correlates a response with the command that caused it
//!   (`0` marks an unsolicited message)
//! - `payload` is a JSON document whose `type` tag matches the frame type

mod error;
mod frame;
mod index;
mod limits;
mod reader;
mod writer;

pub use error::FrameError;
pub use frame::RawFrame;
pub use index::CommandIndex;
pub use limits::{is_known_message_type, max_payload_for_type};
pub use reader::{DEFAULT_FRAME_TIMEOUT, DEFAULT_IDLE_TIMEOUT, FrameHeader, FrameReader};
pub use writer::FrameWriter;

/// Magic bytes opening every frame
pub const MAGIC: &[u8; 2] = b"SL";

/// Field delimiter
pub const DELIMITER: u8 = b'|';

/// Frame terminator
pub const TERMINATOR: u8 = b'\n';

/// Longest message type name accepted
pub const MAX_TYPE_LENGTH: usize = 32;

/// Digits allowed in the type length field
pub const MAX_TYPE_LENGTH_DIGITS: usize = 2;

/// Digits allowed in the index field (fits any u64)
pub const MAX_INDEX_DIGITS: usize = 20;

/// Digits allowed in the payload length field
pub const MAX_PAYLOAD_LENGTH_DIGITS: usize = 20;

/// Global payload ceiling applied to every message type (64 MiB)
pub const MAX_PAYLOAD_LENGTH: u64 = 64 * 1024 * 1024;
