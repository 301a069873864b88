//! Id3Tag handler - reads the ID3v1 tag of an mp3

use std::sync::Arc;

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerResult};
use crate::files::{FileError, parse_entry, read_id3};

pub async fn handle_id3tag(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let relative = parse_entry(args.trim(), ctx.max_path_length)?;

    let roots = Arc::clone(&ctx.roots);
    let tag = tokio::task::spawn_blocking(move || {
        let display = relative.display().to_string();
        let path = roots
            .find_file(&relative)
            .map_err(|_| FileError::NotFound(display.clone()))?;
        read_id3(&path)
            .map_err(|e| FileError::from_io(&path, e))?
            .ok_or(FileError::NoId3Tag(display))
    })
    .await??;

    Ok(Some(SlaveMessage::Id3Tag { tag }))
}
