//! Silo Common Library
//!
//! Wire protocol shared by Silo storage slaves and the master that drives
//! them: framing, message schema, error kinds, and message I/O helpers.

mod error_kind;
pub mod framing;
pub mod io;
pub mod protocol;
pub mod version;

pub use error_kind::ErrorKind;

/// Version information for the slave protocol
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Default port the master listens on for slave control connections
pub const DEFAULT_MASTER_PORT: u16 = 1099;

/// Default maximum path length a slave accepts
pub const DEFAULT_MAX_PATH_LENGTH: u32 = 4096;

/// Maximum length of a slave name sent in the handshake
pub const MAX_SLAVE_NAME_LENGTH: usize = 64;

/// Buffer size for whole-file CRC32 computation
pub const CHECKSUM_BUFFER_SIZE: usize = 16 * 1024;

/// Transfer type byte for binary transfers
pub const TRANSFER_TYPE_BINARY: char = 'I';

/// Transfer type byte for ASCII transfers (LF expanded to CRLF on send)
pub const TRANSFER_TYPE_ASCII: char = 'A';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version() {
        let version = version::protocol_version();
        assert_eq!(version.to_string(), PROTOCOL_VERSION);
    }

    #[test]
    fn test_default_max_path_length() {
        assert_eq!(DEFAULT_MAX_PATH_LENGTH, 4096);
    }

    #[test]
    fn test_transfer_types_differ() {
        assert_ne!(TRANSFER_TYPE_BINARY, TRANSFER_TYPE_ASCII);
    }
}
