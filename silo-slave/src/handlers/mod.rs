//! Command handlers
//!
//! Dispatch is a plain name lookup. Each handler parses its own argument
//! string and returns the response for the command's index, or `None` when
//! it already queued its responses itself (transfers, shutdown) or the
//! command never answers (abort).

mod abort;
mod checksum;
mod checkssl;
mod connect;
mod delete;
pub mod errors;
mod fault;
mod id3tag;
mod listen;
mod maxpath;
mod ping;
mod remerge;
mod rename;
mod sfvfile;
mod shutdown;
mod transfer;

#[cfg(test)]
pub mod testing;

pub use abort::handle_abort;
pub use checksum::handle_checksum;
pub use checkssl::handle_checkssl;
pub use connect::handle_connect;
pub use delete::handle_delete;
pub use errors::HandlerError;
pub use fault::handle_fault;
pub use id3tag::handle_id3tag;
pub use listen::handle_listen;
pub use maxpath::handle_maxpath;
pub use ping::handle_ping;
pub use remerge::{handle_remerge, handle_remerge_pause, handle_remerge_resume};
pub use rename::handle_rename;
pub use sfvfile::handle_sfvfile;
pub use shutdown::handle_shutdown;
pub use transfer::{handle_receive, handle_send, parse_transfer_args};

use std::net::IpAddr;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::FutureExt;
use silo_common::framing::CommandIndex;
use silo_common::protocol::{SlaveMessage, TransferStatus};
use strum::{Display, EnumString, IntoStaticStr};
use tokio_util::sync::CancellationToken;

use crate::connection::{ChannelSettings, Connection};
use crate::constants::ERR_HANDLER_PANICKED;
use crate::outbox::Outbox;
use crate::remerge::RemergeControl;
use crate::roots::RootCollection;
use crate::transfers::{TransferPolicy, TransferRegistry};

/// Result of one handler
pub type HandlerResult = Result<Option<SlaveMessage>, HandlerError>;

/// Every command the slave understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CommandName {
    Ping,
    MaxPath,
    Delete,
    Rename,
    Checksum,
    Id3Tag,
    SfvFile,
    Connect,
    Listen,
    Send,
    Receive,
    Abort,
    Remerge,
    RemergePause,
    RemergeResume,
    CheckSsl,
    Shutdown,
    /// Fault injection for master-side tests
    Error,
}

/// Shared state every handler can reach
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub roots: Arc<RootCollection>,
    pub registry: Arc<TransferRegistry>,
    pub remerge: Arc<RemergeControl>,
    pub channels: ChannelSettings,
    pub policy: TransferPolicy,
    pub outbox: Outbox,
    pub max_path_length: u32,
    pub ignore_partial: bool,
    /// Address advertised in transfer handles
    pub advertised_ip: IpAddr,
    /// Cancelled when the slave is shutting down
    pub shutdown: CancellationToken,
}

impl HandlerContext {
    /// Queue `message` as a response to `index`
    pub fn reply(&self, index: CommandIndex, message: SlaveMessage) {
        if !self.outbox.send(index, message) {
            tracing::debug!(%index, "Dropping response, writer is gone");
        }
    }

    /// Queue an unsolicited disk status
    pub fn push_disk_status(&self) {
        self.outbox.push(SlaveMessage::DiskStatus {
            status: self.roots.disk_status(),
        });
    }

    /// Register a transfer and build the handle returned to the master
    fn register_transfer(&self, connection: Connection, port: u16, address: String) -> SlaveMessage {
        let transfer = self.registry.register(connection);
        let status: TransferStatus = transfer.status();
        SlaveMessage::TransferHandle {
            address,
            port,
            transfer_index: transfer.index(),
            status,
        }
    }
}

/// Run one command and queue its response
pub async fn dispatch(ctx: &HandlerContext, index: CommandIndex, name: &str, args: &str) {
    let result = match CommandName::from_str(name) {
        Ok(command) => {
            tracing::debug!(%index, %command, args, "Handling command");
            contain_panic(run(command, ctx, index, args)).await
        }
        Err(_) => Err(HandlerError::Unsupported(name.to_string())),
    };

    match result {
        Ok(Some(message)) => ctx.reply(index, message),
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(%index, name, error = %e, "Command failed");
            ctx.reply(index, SlaveMessage::exception(e.kind(), e.to_string()));
        }
    }
}

/// Turn a handler panic into an internal error so the index still gets an answer
async fn contain_panic(handler: impl Future<Output = HandlerResult>) -> HandlerResult {
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("{}", ERR_HANDLER_PANICKED);
            Err(HandlerError::Fault(ERR_HANDLER_PANICKED))
        }
    }
}

async fn run(
    command: CommandName,
    ctx: &HandlerContext,
    index: CommandIndex,
    args: &str,
) -> HandlerResult {
    match command {
        CommandName::Ping => handle_ping(),
        CommandName::MaxPath => handle_maxpath(ctx),
        CommandName::Delete => handle_delete(ctx, args).await,
        CommandName::Rename => handle_rename(ctx, args).await,
        CommandName::Checksum => handle_checksum(ctx, args).await,
        CommandName::Id3Tag => handle_id3tag(ctx, args).await,
        CommandName::SfvFile => handle_sfvfile(ctx, args).await,
        CommandName::Connect => handle_connect(ctx, args).await,
        CommandName::Listen => handle_listen(ctx, args),
        CommandName::Send => handle_send(ctx, index, args).await,
        CommandName::Receive => handle_receive(ctx, index, args).await,
        CommandName::Abort => handle_abort(ctx, args),
        CommandName::Remerge => handle_remerge(ctx, args).await,
        CommandName::RemergePause => handle_remerge_pause(ctx),
        CommandName::RemergeResume => handle_remerge_resume(ctx),
        CommandName::CheckSsl => handle_checkssl(ctx),
        CommandName::Shutdown => handle_shutdown(ctx, index),
        CommandName::Error => handle_fault(),
    }
}

/// Parse a boolean argument the way the master writes it
pub(crate) fn parse_flag(command: &'static str, value: &str) -> Result<bool, HandlerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(HandlerError::invalid(command, format!("bad flag {other:?}"))),
    }
}
