//! Abort handler - fire and forget, never answers

use silo_common::protocol::TransferIndex;

use super::{HandlerContext, HandlerResult};
use crate::constants::ABORT_REASON_DEFAULT;

/// Parse `<index>[,<reason>]` and signal the transfer
pub fn handle_abort(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let (index, reason) = match args.split_once(',') {
        Some((index, reason)) if !reason.trim().is_empty() => (index, reason.trim()),
        Some((index, _)) => (index, ABORT_REASON_DEFAULT),
        None => (args, ABORT_REASON_DEFAULT),
    };

    let Ok(index) = index.trim().parse::<u64>().map(TransferIndex::new) else {
        tracing::warn!(args, "Ignoring abort with malformed transfer index");
        return Ok(None);
    };

    if !ctx.registry.abort(index, reason) {
        tracing::debug!(transfer = %index, "Abort for unknown transfer");
    }
    Ok(None)
}
