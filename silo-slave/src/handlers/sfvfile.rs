//! SfvFile handler - parses an SFV checksum list

use std::sync::Arc;

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};
use crate::files::{FileError, parse_entry, read_sfv};

pub async fn handle_sfvfile(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let relative = parse_entry(args.trim(), ctx.max_path_length)?;

    let roots = Arc::clone(&ctx.roots);
    let entries = tokio::task::spawn_blocking(move || {
        let path = roots
            .find_file(&relative)
            .map_err(|_| FileError::NotFound(relative.display().to_string()))?;
        read_sfv(&path).map_err(|e| FileError::from_io(&path, e))
    })
    .await??;

    Ok(Some(SlaveMessage::SfvFile { entries }))
}
