//! Remerge: report the true on-disk tree to the master
//!
//! The walk is depth-first. Each directory's merged listing is pushed as one
//! unsolicited `Remerge` message before its children are visited, so the
//! master can reconcile incrementally and the slave never holds more than one
//! path of the tree in memory. Partial remerges skip directories nothing
//! changed in since the master's cutoff.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use silo_common::protocol::SlaveMessage;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::constants::ERR_RESPONSE_CHANNEL_CLOSED;
use crate::files::{PathError, master_path, parse_relative};
use crate::outbox::Outbox;
use crate::roots::{DirListing, RootCollection, system_time_millis};

/// Parsed `remerge` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemergeRequest {
    /// Directory to start from (empty = every root's top level)
    pub path: PathBuf,
    pub partial: bool,
    /// Master-clock cutoff in ms; `i64::MIN` disables skipping
    pub skip_age_cutoff: i64,
    /// Master clock in ms when the command was sent
    pub master_time: i64,
    /// The master wants everything at once, so partial mode is off
    pub instant_online: bool,
}

impl RemergeRequest {
    /// Full remerge of `path`
    pub fn full(path: PathBuf) -> Self {
        Self {
            path,
            partial: false,
            skip_age_cutoff: i64::MIN,
            master_time: 0,
            instant_online: false,
        }
    }

    /// Parse `[<path>[,<partial>,<cutoff>,<masterTime>[,<instantOnline>]]]`
    ///
    /// Trailing fields are only taken as options when they all parse, so a
    /// path containing commas still works.
    pub fn parse(args: &str, max_path: u32) -> Result<Self, PathError> {
        let fields: Vec<&str> = args.split(',').collect();

        for tail in [4usize, 3] {
            if fields.len() <= tail {
                continue;
            }
            let split = fields.len() - tail;
            let opts = &fields[split..];
            let parsed = (
                parse_bool(opts[0]),
                opts[1].trim().parse::<i64>().ok(),
                opts[2].trim().parse::<i64>().ok(),
                if tail == 4 { parse_bool(opts[3]) } else { Some(false) },
            );
            if let (Some(partial), Some(cutoff), Some(master_time), Some(instant)) = parsed {
                return Ok(Self {
                    path: parse_relative(&fields[..split].join(","), max_path)?,
                    partial,
                    skip_age_cutoff: cutoff,
                    master_time,
                    instant_online: instant,
                });
            }
        }

        Ok(Self::full(parse_relative(args.trim(), max_path)?))
    }

    /// Cutoff shifted onto the slave's clock, or `None` for a full walk
    fn effective_cutoff(&self, ignore_partial: bool, now_ms: i64) -> Option<i64> {
        if !self.partial || ignore_partial || self.instant_online {
            return None;
        }
        if self.skip_age_cutoff == i64::MIN {
            return Some(i64::MIN);
        }
        let skew = now_ms.saturating_sub(self.master_time);
        Some(self.skip_age_cutoff.saturating_add(skew))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// Guards the single running remerge and its pause flag
#[derive(Debug)]
pub struct RemergeControl {
    running: AtomicBool,
    paused: watch::Sender<bool>,
}

impl RemergeControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            paused: watch::Sender::new(false),
        }
    }

    /// Claim the remerge slot; `None` while another remerge runs
    pub fn try_start(&self) -> Option<RemergeGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                self.paused.send_replace(false);
                RemergeGuard { control: self }
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    async fn wait_resumed(&self) {
        let mut rx = self.paused.subscribe();
        // the sender lives in self, so this only ends when resumed
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for RemergeControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the remerge slot on drop
#[derive(Debug)]
pub struct RemergeGuard<'a> {
    control: &'a RemergeControl,
}

impl Drop for RemergeGuard<'_> {
    fn drop(&mut self) {
        self.control.running.store(false, Ordering::Release);
    }
}

/// Walk the tree and push one `Remerge` message per reported directory
///
/// Returns the number of directories reported.
pub async fn run_remerge(
    roots: &RootCollection,
    request: &RemergeRequest,
    ignore_partial: bool,
    control: &RemergeControl,
    outbox: &Outbox,
    cancel: &CancellationToken,
) -> io::Result<usize> {
    let now_ms = i64::try_from(system_time_millis(SystemTime::now())).unwrap_or(i64::MAX);
    let cutoff = request.effective_cutoff(ignore_partial, now_ms);

    let mut stack = vec![request.path.clone()];
    let mut reported = 0;

    while let Some(dir) = stack.pop() {
        if control.is_paused() {
            tracing::info!("Remerge paused");
            tokio::select! {
                _ = cancel.cancelled() => return Ok(reported),
                _ = control.wait_resumed() => tracing::info!("Remerge resumed"),
            }
        }
        if cancel.is_cancelled() {
            return Ok(reported);
        }

        let Some(listing) = roots.list_dir(&dir).await? else {
            continue;
        };

        for entry in listing.entries.iter().rev().filter(|e| e.is_dir) {
            stack.push(dir.join(&entry.name));
        }

        if !is_changed(&listing, cutoff) {
            continue;
        }

        let message = SlaveMessage::Remerge {
            path: master_path(&dir),
            entries: listing.entries,
            dir_mtime: listing.dir_mtime,
        };
        if !outbox.push(message) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                ERR_RESPONSE_CHANNEL_CLOSED,
            ));
        }
        reported += 1;
    }

    Ok(reported)
}

/// Whether a directory must be reported under `cutoff`
fn is_changed(listing: &DirListing, cutoff: Option<i64>) -> bool {
    let Some(cutoff) = cutoff else {
        return true;
    };
    let newer = |mtime: u64| i64::try_from(mtime).unwrap_or(i64::MAX) > cutoff;
    newer(listing.dir_mtime) || listing.entries.iter().any(|e| newer(e.last_modified))
}
