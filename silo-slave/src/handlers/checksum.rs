//! Checksum handler - CRC32 of a whole file

use std::sync::Arc;

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};
use crate::files::{self, parse_entry};

pub async fn handle_checksum(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let relative = parse_entry(args.trim(), ctx.max_path_length)?;

    let roots = Arc::clone(&ctx.roots);
    let checksum =
        tokio::task::spawn_blocking(move || files::checksum(&roots, &relative)).await??;

    Ok(Some(SlaveMessage::Checksum { checksum }))
}
