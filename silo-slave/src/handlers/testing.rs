//! Handler test harness: temp roots plus a captured outbox

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use super::HandlerContext;
use crate::connection::ChannelSettings;
use crate::outbox::{Outbox, Outgoing};
use crate::port_range::PortRange;
use crate::remerge::RemergeControl;
use crate::roots::{MostFree, RootCollection, RootOptions};
use crate::transfers::{TransferPolicy, TransferRegistry};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

pub struct TestSlave {
    pub ctx: HandlerContext,
    rx: UnboundedReceiver<Outgoing>,
    dirs: Vec<TempDir>,
}

impl TestSlave {
    pub fn new(root_count: usize) -> Self {
        Self::with_accept_timeout(root_count, Duration::from_secs(5))
    }

    pub fn with_accept_timeout(root_count: usize, accept_timeout: Duration) -> Self {
        let dirs: Vec<TempDir> = (0..root_count).map(|_| TempDir::new().unwrap()).collect();
        let paths: Vec<PathBuf> = dirs.iter().map(|d| d.path().to_path_buf()).collect();
        let options = RootOptions {
            allow_shared_mounts: true,
            ..RootOptions::default()
        };
        let roots = RootCollection::from_paths(&paths, Box::new(MostFree), options).unwrap();

        let (outbox, rx) = Outbox::channel();
        let ctx = HandlerContext {
            roots: Arc::new(roots),
            registry: Arc::new(TransferRegistry::new()),
            remerge: Arc::new(RemergeControl::new()),
            channels: ChannelSettings {
                tls: None,
                port_range: PortRange::any(0),
                bind_ip: Some(LOOPBACK),
                buffer_size: 0,
                accept_timeout,
                connect_timeout: Duration::from_secs(5),
            },
            policy: TransferPolicy::default(),
            outbox,
            max_path_length: 4096,
            ignore_partial: false,
            advertised_ip: LOOPBACK,
            shutdown: CancellationToken::new(),
        };

        Self { ctx, rx, dirs }
    }

    /// Next queued message, failing the test after a few seconds
    pub async fn next(&mut self) -> Outgoing {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("outbox closed")
    }

    pub fn try_next(&mut self) -> Option<Outgoing> {
        self.rx.try_recv().ok()
    }

    /// Write a file under root `root`, creating parents
    pub fn write(&self, root: usize, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.path(root, relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, data).unwrap();
        path
    }

    pub fn path(&self, root: usize, relative: &str) -> PathBuf {
        self.root(root).join(relative)
    }

    pub fn root(&self, root: usize) -> &Path {
        self.dirs[root].path()
    }
}
