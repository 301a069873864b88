//! Rename handler - `<from>,<toDir>,<toName>`

use std::path::PathBuf;
use std::sync::Arc;

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerError, HandlerResult};
use crate::files::{self, parse_entry, parse_relative};

/// Split from the right, so only the source path may contain commas
fn parse_args(ctx: &HandlerContext, args: &str) -> Result<(PathBuf, PathBuf, String), HandlerError> {
    let mut fields = args.rsplitn(3, ',');
    let (Some(to_name), Some(to_dir), Some(from)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(HandlerError::invalid("rename", "expected <from>,<toDir>,<toName>"));
    };

    let to_name = to_name.trim();
    if to_name.is_empty() || to_name.contains('/') || to_name == "." || to_name == ".." {
        return Err(HandlerError::invalid("rename", format!("bad name {to_name:?}")));
    }

    let from = parse_entry(from.trim(), ctx.max_path_length)?;
    let to_dir = parse_relative(to_dir.trim(), ctx.max_path_length)?;
    Ok((from, to_dir, to_name.to_string()))
}

pub async fn handle_rename(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let (from, to_dir, to_name) = parse_args(ctx, args)?;

    let roots = Arc::clone(&ctx.roots);
    tokio::task::spawn_blocking(move || files::rename(&roots, &from, &to_dir, &to_name))
        .await??;

    Ok(Some(SlaveMessage::Ack))
}
