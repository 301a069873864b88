//! Transfer table
//!
//! Maps every outstanding [`TransferIndex`] to its [`Transfer`]. Indices come
//! from a per-registry counter and are never reused. Insert, lookup, and
//! removal each take the lock once and never hold it across I/O.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use silo_common::protocol::TransferIndex;

use super::transfer::Transfer;
use super::types::TransferDirection;
use crate::connection::Connection;

/// Registry of transfers created by `connect`/`listen`
#[derive(Debug)]
pub struct TransferRegistry {
    transfers: Mutex<HashMap<TransferIndex, Arc<Transfer>>>,
    next_index: AtomicU64,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self {
            transfers: Mutex::new(HashMap::new()),
            next_index: AtomicU64::new(1),
        }
    }

    /// Allocate an index and register a transfer waiting on `connection`
    pub fn register(&self, connection: Connection) -> Arc<Transfer> {
        let index = TransferIndex::new(self.next_index.fetch_add(1, Ordering::Relaxed));
        let transfer = Arc::new(Transfer::new(index, connection));

        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .insert(index, Arc::clone(&transfer));

        transfer
    }

    pub fn get(&self, index: TransferIndex) -> Option<Arc<Transfer>> {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .get(&index)
            .cloned()
    }

    /// Remove a transfer (called when it finishes or is abandoned)
    pub fn unregister(&self, index: TransferIndex) {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .remove(&index);
    }

    /// Abort one transfer; returns false for unknown indices
    ///
    /// A transfer nobody started is dropped from the table right away, which
    /// closes its pending listener. A running one is removed by its runner.
    pub fn abort(&self, index: TransferIndex, reason: &str) -> bool {
        let Some(transfer) = self.get(index) else {
            return false;
        };
        transfer.abort(reason);
        if !transfer.is_started() {
            self.unregister(index);
        }
        true
    }

    /// Abort every transfer, returning how many were signaled
    pub fn abort_all(&self, reason: &str) -> usize {
        let transfers: Vec<Arc<Transfer>> = self
            .transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .drain()
            .map(|(_, transfer)| transfer)
            .collect();

        for transfer in &transfers {
            transfer.abort(reason);
        }
        transfers.len()
    }

    /// Running upload of `path` (case-insensitive), other than `exclude`
    pub fn upload_for(&self, path: &Path, exclude: TransferIndex) -> Option<Arc<Transfer>> {
        let wanted = path.to_string_lossy().to_lowercase();
        self.snapshot().into_iter().find(|transfer| {
            transfer.index() != exclude
                && !transfer.is_finished()
                && transfer.direction() == TransferDirection::Receiving
                && transfer
                    .path()
                    .is_some_and(|p| p.to_string_lossy().to_lowercase() == wanted)
        })
    }

    /// All registered transfers
    pub fn snapshot(&self) -> Vec<Arc<Transfer>> {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.transfers
            .lock()
            .expect("transfer registry lock poisoned")
            .len()
    }
}

impl Default for TransferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that unregisters a transfer when dropped
///
/// Runners hold one for the whole run so the entry goes away on every exit
/// path, including cancellation of the runner's task.
pub struct TransferRegistryGuard<'a> {
    registry: &'a TransferRegistry,
    index: TransferIndex,
}

impl<'a> TransferRegistryGuard<'a> {
    pub fn new(registry: &'a TransferRegistry, index: TransferIndex) -> Self {
        Self { registry, index }
    }
}

impl Drop for TransferRegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.index);
    }
}
