//! Send and receive handlers
//!
//! Both acknowledge once they hold the transfer's data channel, run it to
//! completion, and answer with the terminal status. Periodic statuses in
//! between carry the same command index.

use std::net::IpAddr;
use std::sync::Arc;

use ipnet::IpNet;
use silo_common::framing::CommandIndex;
use silo_common::protocol::{SlaveMessage, TransferIndex};

use super::{CommandName, HandlerContext, HandlerError, HandlerResult};
use crate::files::parse_entry;
use crate::transfers::{
    TransferContext, TransferDirection, TransferRegistryGuard, TransferRequest, TransferType,
};

/// Parse `<type>,<offset>,<index>[,min=<n>][,max=<n>][,peer=<mask>],<path>`
///
/// The path is everything after the recognised fields and may contain commas.
pub fn parse_transfer_args(
    command: &'static str,
    args: &str,
    max_path: u32,
) -> Result<TransferRequest, HandlerError> {
    let mut fields = args.splitn(4, ',');
    let (Some(kind), Some(offset), Some(index), Some(mut rest)) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(HandlerError::invalid(
            command,
            "expected <type>,<offset>,<index>,<path>",
        ));
    };

    let mut chars = kind.trim().chars();
    let transfer_type = match (chars.next(), chars.next()) {
        (Some(c), None) => TransferType::from_char(c),
        _ => None,
    }
    .ok_or_else(|| HandlerError::invalid(command, format!("bad transfer type {kind:?}")))?;

    let offset = offset
        .trim()
        .parse::<u64>()
        .map_err(|_| HandlerError::invalid(command, format!("bad offset {offset:?}")))?;
    let transfer_index = index
        .trim()
        .parse::<u64>()
        .map(TransferIndex::new)
        .map_err(|_| HandlerError::invalid(command, format!("bad transfer index {index:?}")))?;

    let mut min_speed = 0;
    let mut max_speed = 0;
    let mut peer = None;
    while let Some((field, tail)) = rest.split_once(',') {
        if let Some(value) = field.strip_prefix("min=") {
            min_speed = parse_speed(command, value)?;
        } else if let Some(value) = field.strip_prefix("max=") {
            max_speed = parse_speed(command, value)?;
        } else if let Some(value) = field.strip_prefix("peer=") {
            peer = Some(parse_mask(command, value)?);
        } else {
            break;
        }
        rest = tail;
    }

    Ok(TransferRequest {
        transfer_type,
        offset,
        transfer_index,
        min_speed,
        max_speed,
        peer,
        path: parse_entry(rest, max_path)?,
    })
}

fn parse_speed(command: &'static str, value: &str) -> Result<u64, HandlerError> {
    value
        .trim()
        .parse()
        .map_err(|_| HandlerError::invalid(command, format!("bad speed {value:?}")))
}

fn parse_mask(command: &'static str, value: &str) -> Result<IpNet, HandlerError> {
    let value = value.trim();
    value
        .parse::<IpNet>()
        .or_else(|_| value.parse::<IpAddr>().map(IpNet::from))
        .map_err(|_| HandlerError::invalid(command, format!("bad peer mask {value:?}")))
}

pub async fn handle_send(ctx: &HandlerContext, index: CommandIndex, args: &str) -> HandlerResult {
    run_transfer(ctx, index, args, CommandName::Send).await
}

pub async fn handle_receive(ctx: &HandlerContext, index: CommandIndex, args: &str) -> HandlerResult {
    run_transfer(ctx, index, args, CommandName::Receive).await
}

async fn run_transfer(
    ctx: &HandlerContext,
    index: CommandIndex,
    args: &str,
    command: CommandName,
) -> HandlerResult {
    let request = parse_transfer_args(command.into(), args, ctx.max_path_length)?;
    let transfer = ctx
        .registry
        .get(request.transfer_index)
        .ok_or(HandlerError::TransferNotFound(request.transfer_index))?;
    let direction = match command {
        CommandName::Send => TransferDirection::Sending,
        _ => TransferDirection::Receiving,
    };
    let connection = transfer.claim(direction, &request.path)?;

    let _guard = TransferRegistryGuard::new(&ctx.registry, transfer.index());
    ctx.reply(index, SlaveMessage::Ack);

    let transfer_ctx = TransferContext {
        roots: Arc::clone(&ctx.roots),
        registry: Arc::clone(&ctx.registry),
        policy: ctx.policy.clone(),
        outbox: ctx.outbox.clone(),
        command_index: index,
    };

    let status = match direction {
        TransferDirection::Sending => transfer.send(connection, &request, &transfer_ctx).await,
        _ => transfer.receive(connection, &request, &transfer_ctx).await,
    };

    match &status.error {
        None => tracing::info!(
            transfer = %transfer.index(),
            bytes = status.transferred,
            speed = status.speed(),
            "Transfer finished"
        ),
        Some(error) => tracing::info!(
            transfer = %transfer.index(),
            kind = %error.kind,
            reason = %error.message,
            "Transfer failed"
        ),
    }
    Ok(Some(SlaveMessage::TransferStatus { status }))
}
