//! Remerge handlers - inventory walk plus pause and resume

use silo_common::protocol::SlaveMessage;

use super::{HandlerContext, HandlerError, HandlerResult};
use crate::constants::{MSG_REMERGE_FINISHED, MSG_REMERGE_STARTED};
use crate::remerge::{RemergeRequest, run_remerge};

/// Walk the requested tree, streaming one `Remerge` per directory, then ack
pub async fn handle_remerge(ctx: &HandlerContext, args: &str) -> HandlerResult {
    let request = RemergeRequest::parse(args, ctx.max_path_length)?;
    let Some(_running) = ctx.remerge.try_start() else {
        return Err(HandlerError::AlreadyRemerging);
    };

    tracing::info!(
        path = %request.path.display(),
        partial = request.partial,
        "{}",
        MSG_REMERGE_STARTED
    );
    let reported = run_remerge(
        &ctx.roots,
        &request,
        ctx.ignore_partial,
        &ctx.remerge,
        &ctx.outbox,
        &ctx.shutdown,
    )
    .await?;
    tracing::info!(directories = reported, "{}", MSG_REMERGE_FINISHED);

    Ok(Some(SlaveMessage::Ack))
}

pub fn handle_remerge_pause(ctx: &HandlerContext) -> HandlerResult {
    ctx.remerge.pause();
    Ok(Some(SlaveMessage::Ack))
}

pub fn handle_remerge_resume(ctx: &HandlerContext) -> HandlerResult {
    ctx.remerge.resume();
    Ok(Some(SlaveMessage::Ack))
}
