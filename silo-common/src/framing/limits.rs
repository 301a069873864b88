//! Per-type payload limits for protocol messages

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::DEFAULT_MAX_PATH_LENGTH;

/// Apply 20% padding to a limit for safety margin
const fn pad_limit(base: u64) -> u64 {
    (base * 6) / 5
}

/// Largest `Command` payload: a `rename` carries two paths and a name
/// {"type":"Command","name":"...16...","args":"<path>,<path>,<name>"}
const COMMAND_BASE: u64 = 64 + 3 * DEFAULT_MAX_PATH_LENGTH as u64;

/// Maximum payload sizes for each message type
///
/// Limits are checked after the header is parsed and before the payload is
/// read, so oversized messages are rejected without buffering them.
///
/// A limit of `0` means only the global `MAX_PAYLOAD_LENGTH` applies. Remerge
/// listings and SFV contents scale with directory size and use it.
static MESSAGE_TYPE_LIMITS: LazyLock<HashMap<&'static str, u64>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Master messages
    m.insert("Command", pad_limit(COMMAND_BASE));
    m.insert("HandshakeResponse", pad_limit(1100)); // error text up to 1024

    // Slave messages
    m.insert("Handshake", pad_limit(140)); // name (64) + version (32) + overhead
    m.insert("Ack", pad_limit(14)); // {"type":"Ack"}
    m.insert("TransferHandle", pad_limit(COMMAND_BASE + 512)); // status errors may echo paths
    m.insert("DiskStatus", pad_limit(110)); // two u64 values + overhead
    m.insert("TransferStatus", pad_limit(COMMAND_BASE + 512));
    m.insert("Checksum", pad_limit(48));
    m.insert("MaxPath", pad_limit(40));
    m.insert("Id3Tag", pad_limit(1200)); // five 30-byte fields, worst-case escaped
    m.insert("SslCheck", pad_limit(40));
    m.insert("Exception", pad_limit(COMMAND_BASE + 256)); // messages may echo paths
    m.insert("SfvFile", 0);
    m.insert("Remerge", 0);

    m
});

/// Maximum payload size for a message type (`0` = global limit only)
#[must_use]
pub fn max_payload_for_type(message_type: &str) -> u64 {
    MESSAGE_TYPE_LIMITS.get(message_type).copied().unwrap_or(0)
}

/// Whether the message type is part of the protocol
#[must_use]
pub fn is_known_message_type(message_type: &str) -> bool {
    MESSAGE_TYPE_LIMITS.contains_key(message_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert!(is_known_message_type("Command"));
        assert!(is_known_message_type("Remerge"));
        assert!(!is_known_message_type("ChatSend"));
        assert!(!is_known_message_type(""));
    }

    #[test]
    fn test_unlimited_types() {
        assert_eq!(max_payload_for_type("Remerge"), 0);
        assert_eq!(max_payload_for_type("SfvFile"), 0);
    }

    #[test]
    fn test_command_fits_rename_of_max_paths() {
        let path = "p".repeat(DEFAULT_MAX_PATH_LENGTH as usize);
        let payload = serde_json::json!({
            "type": "Command",
            "name": "rename",
            "args": format!("{path},{path},{path}"),
        });
        let len = serde_json::to_vec(&payload).unwrap().len() as u64;
        assert!(len <= max_payload_for_type("Command"));
    }

    #[test]
    fn test_disk_status_fits_max_values() {
        let payload = serde_json::json!({
            "type": "DiskStatus",
            "status": { "available": u64::MAX, "capacity": u64::MAX },
        });
        let len = serde_json::to_vec(&payload).unwrap().len() as u64;
        assert!(len <= max_payload_for_type("DiskStatus"));
    }

    #[test]
    fn test_pad_limit() {
        assert_eq!(pad_limit(100), 120);
        assert_eq!(pad_limit(0), 0);
    }
}
