//! Transfer engine
//!
//! `connect`/`listen` register a [`Transfer`] holding a pending data channel.
//! `send`/`receive` claim it, stream the file with throttling, speed floor,
//! and CRC32, then report a terminal [`TransferStatus`](silo_common::protocol::TransferStatus).

mod ascii;
mod registry;
mod throttle;
mod transfer;
mod types;

pub use ascii::AsciiEncoder;
pub use registry::{TransferRegistry, TransferRegistryGuard};
pub use throttle::Throttle;
pub use transfer::{Transfer, TransferContext};
pub use types::{
    TransferDirection, TransferError, TransferPolicy, TransferRequest, TransferType,
};
