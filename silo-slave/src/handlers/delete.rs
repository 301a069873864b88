//! Delete handler - removes a path from every root holding it

use std::sync::Arc;

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};
use crate::files::{self, parse_entry};

/// Delete a file or directory tree, then report the new free space
pub async fn handle_delete(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let relative = parse_entry(args.trim(), ctx.max_path_length)?;

    let roots = Arc::clone(&ctx.roots);
    let target = relative.clone();
    tokio::task::spawn_blocking(move || files::delete(&roots, &target)).await??;

    tracing::info!(path = %relative.display(), "Deleted");
    ctx.push_disk_status();
    Ok(Some(SlaveMessage::Ack))
}
