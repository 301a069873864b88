//! Error handler - fails on purpose so the master can test its error path

use super::{HandlerError, HandlerResult};
use crate::constants::ERR_FAULT_INJECTED;

pub fn handle_fault() -> HandlerResult {
    Err(HandlerError::Fault(ERR_FAULT_INJECTED))
}
