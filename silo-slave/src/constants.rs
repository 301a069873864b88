//! Constants for the slave daemon

use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Directory under the platform config dir holding slave configuration
pub const CONFIG_DIR_NAME: &str = "silo";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "slave.toml";

/// Certificate file name inside the TLS certificate directory
pub const CERT_FILE_NAME: &str = "cert.pem";

/// Default TLS certificate directory under the config directory
pub const CERT_DIR_NAME: &str = "certs";

/// Private key file name inside the TLS certificate directory
pub const KEY_FILE_NAME: &str = "key.pem";

/// Common name used for generated self-signed certificates
pub const CERT_COMMON_NAME: &str = "Silo Slave";

// =============================================================================
// Transfers
// =============================================================================

/// Smallest read/write buffer used by the transfer loop
pub const MIN_TRANSFER_BUFFER: usize = 64 * 1024;

/// Reason recorded on transfers aborted during shutdown
pub const ABORT_REASON_SHUTDOWN: &str = "slave shutting down";

/// Reason recorded when a transfer is aborted without one
pub const ABORT_REASON_DEFAULT: &str = "aborted by master";

/// Bound on one frame once its first byte has arrived
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(60);

/// How long running commands get to queue their last responses at shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Log Messages
// =============================================================================

pub const MSG_CONNECTING: &str = "Connecting to master at ";
pub const MSG_CONNECTED: &str = "Connected to master, handshake accepted";
pub const MSG_SHUTDOWN_SIGNAL: &str = "Shutdown signal received";
pub const MSG_SHUTDOWN_COMMAND: &str = "Shutdown requested by master";
pub const MSG_REMERGE_STARTED: &str = "Remerge started";
pub const MSG_REMERGE_FINISHED: &str = "Remerge finished";

// =============================================================================
// Error Messages
// =============================================================================

pub const ERR_HANDSHAKE_REJECTED: &str = "Master rejected handshake: ";
pub const ERR_HANDSHAKE_UNEXPECTED: &str = "Unexpected message during handshake";
pub const ERR_HANDSHAKE_TIMEOUT: &str = "Timed out waiting for handshake response";
pub const ERR_CONTROL_CLOSED: &str = "Control connection closed by master";
pub const ERR_CONTROL_INACTIVE: &str = "No traffic from master within the inactivity timeout";
pub const ERR_RESPONSE_CHANNEL_CLOSED: &str = "Response channel closed";
pub const ERR_UNSUPPORTED_COMMAND: &str = " - Operation Not Supported";
pub const ERR_TRANSFER_NOT_FOUND: &str = "Transfer not found: ";
pub const ERR_PATH_EXISTS: &str = " already exists";
pub const ERR_PATH_NOT_FOUND: &str = " does not exist on any root";
pub const ERR_NO_ID3_TAG: &str = "No ID3v1 tag in ";
pub const ERR_FAULT_INJECTED: &str = "Fault injected by master";
pub const ERR_HANDLER_PANICKED: &str = "Command handler panicked";
pub const ERR_RECEIVE_OFFSET: &str = "Resuming uploads is not supported";
pub const ERR_PEER_DENIED: &str = "Data connection from unexpected address ";
pub const ERR_TOO_SLOW: &str = "Transfer below minimum speed: ";
pub const ERR_TLS_UNAVAILABLE: &str = "TLS is not configured on this slave";
pub const ERR_WORKERS_CLOSED: &str = "Worker pool closed";
