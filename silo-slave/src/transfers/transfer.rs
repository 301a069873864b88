//! One transfer and its state machine
//!
//! A transfer is created by `connect`/`listen` holding an unestablished data
//! channel, started once by `send` or `receive`, and finished exactly once.
//! Natural EOF, I/O failure, abort, and the speed floor all end in
//! [`Transfer::finish`], which stamps the finish time and records the failure.

use std::io::SeekFrom;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ipnet::IpNet;
use silo_common::framing::CommandIndex;
use silo_common::protocol::{FailureInfo, SlaveMessage, TransferIndex, TransferStatus};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use super::ascii::AsciiEncoder;
use super::registry::TransferRegistry;
use super::throttle::Throttle;
use super::types::{TransferDirection, TransferError, TransferPolicy, TransferRequest, TransferType};
use crate::connection::{Connection, Established};
use crate::constants::{ABORT_REASON_DEFAULT, ERR_RECEIVE_OFFSET};
use crate::outbox::Outbox;
use crate::roots::RootCollection;

/// Shared services a running transfer needs
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub roots: Arc<RootCollection>,
    pub registry: Arc<TransferRegistry>,
    pub policy: TransferPolicy,
    pub outbox: Outbox,
    /// Index of the `send`/`receive` command that status pushes answer
    pub command_index: CommandIndex,
}

#[derive(Debug, Default)]
struct TransferState {
    direction: Option<TransferDirection>,
    connection: Option<Connection>,
    path: Option<PathBuf>,
    started: Option<Instant>,
    finished_at: Option<Instant>,
    abort_reason: Option<String>,
    error: Option<FailureInfo>,
}

/// How the copy loop should treat one stream pair
struct PumpPlan<'a> {
    ctx: &'a TransferContext,
    checksum: bool,
    ascii: bool,
    min_speed: u64,
    max_speed: u64,
    follow: Option<Arc<Transfer>>,
}

/// A single upload or download
#[derive(Debug)]
pub struct Transfer {
    index: TransferIndex,
    state: Mutex<TransferState>,
    transferred: AtomicU64,
    checksum: AtomicU32,
    finished: AtomicBool,
    cancel: CancellationToken,
}

impl Transfer {
    /// New transfer waiting on `connection`
    pub fn new(index: TransferIndex, connection: Connection) -> Self {
        Self {
            index,
            state: Mutex::new(TransferState {
                connection: Some(connection),
                ..TransferState::default()
            }),
            transferred: AtomicU64::new(0),
            checksum: AtomicU32::new(0),
            finished: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn index(&self) -> TransferIndex {
        self.index
    }

    pub fn direction(&self) -> TransferDirection {
        self.lock().direction.unwrap_or(TransferDirection::Unknown)
    }

    /// Relative path once `send`/`receive` started
    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    /// Whether `send`/`receive` has claimed the data channel
    pub fn is_started(&self) -> bool {
        self.lock().direction.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Bytes moved so far
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Relaxed)
    }

    /// Snapshot of the current progress
    pub fn status(&self) -> TransferStatus {
        let state = self.lock();
        let elapsed_ms = state.started.map_or(0, |started| {
            let end = state.finished_at.unwrap_or_else(Instant::now);
            u64::try_from(end.saturating_duration_since(started).as_millis()).unwrap_or(u64::MAX)
        });

        TransferStatus {
            transfer_index: self.index,
            elapsed_ms,
            transferred: self.transferred(),
            checksum: self.checksum.load(Ordering::Relaxed),
            finished: state.finished_at.is_some() || state.error.is_some(),
            error: state.error.clone(),
        }
    }

    /// Request an abort; a no-op once the transfer has finished
    pub fn abort(&self, reason: &str) {
        if self.is_finished() {
            return;
        }
        {
            let mut state = self.lock();
            if state.abort_reason.is_none() {
                state.abort_reason = Some(reason.to_string());
            }
        }
        tracing::debug!(transfer = %self.index, reason, "Aborting transfer");
        self.cancel.cancel();
    }

    /// Claim the data channel for one direction
    ///
    /// Only the first caller gets the connection; later callers get
    /// `AlreadyStarted` and must not touch the transfer's terminal state.
    pub fn claim(
        &self,
        direction: TransferDirection,
        path: &Path,
    ) -> Result<Connection, TransferError> {
        let mut state = self.lock();
        let connection = state
            .connection
            .take()
            .ok_or(TransferError::AlreadyStarted(self.index))?;
        state.direction = Some(direction);
        state.path = Some(path.to_path_buf());
        Ok(connection)
    }

    /// Run an upload from the client into `request.path` over a claimed channel
    pub async fn receive(
        &self,
        connection: Connection,
        request: &TransferRequest,
        ctx: &TransferContext,
    ) -> TransferStatus {
        let result = self.run_receive(connection, request, ctx).await;
        self.finish(result)
    }

    /// Run a download of `request.path` to the client over a claimed channel
    pub async fn send(
        &self,
        connection: Connection,
        request: &TransferRequest,
        ctx: &TransferContext,
    ) -> TransferStatus {
        let result = self.run_send(connection, request, ctx).await;
        self.finish(result)
    }

    /// Stamp the terminal state exactly once and return the final status
    pub fn finish(&self, result: Result<(), TransferError>) -> TransferStatus {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let mut state = self.lock();
            state.finished_at = Some(Instant::now());
            state.connection = None;
            match &result {
                Ok(()) => {
                    tracing::debug!(transfer = %self.index, bytes = self.transferred(), "Transfer complete");
                }
                Err(e) => {
                    tracing::debug!(transfer = %self.index, error = %e, "Transfer failed");
                    state.error = Some(e.to_failure());
                }
            }
        }
        self.status()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransferState> {
        self.state.lock().expect("transfer state lock poisoned")
    }

    fn abort_error(&self) -> TransferError {
        let reason = self
            .lock()
            .abort_reason
            .clone()
            .unwrap_or_else(|| ABORT_REASON_DEFAULT.to_string());
        TransferError::Aborted(reason)
    }

    fn check_aborted(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            return Err(self.abort_error());
        }
        Ok(())
    }

    /// Wait for the data channel unless aborted first, then check the peer
    async fn establish(
        &self,
        connection: Connection,
        peer: Option<IpNet>,
    ) -> Result<Established, TransferError> {
        let established = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(self.abort_error()),
            result = connection.establish() => result?,
        };

        if let Some(mask) = peer {
            let ip: IpAddr = established.peer.ip().to_canonical();
            if !mask.contains(&ip) {
                return Err(TransferError::Denied(ip));
            }
        }

        self.lock().started = Some(Instant::now());
        Ok(established)
    }

    async fn run_receive(
        &self,
        connection: Connection,
        request: &TransferRequest,
        ctx: &TransferContext,
    ) -> Result<(), TransferError> {
        self.check_aborted()?;
        if request.offset != 0 {
            return Err(TransferError::Invalid(ERR_RECEIVE_OFFSET.to_string()));
        }

        let shown = request.path.display().to_string();
        if ctx.roots.exists(&request.path) {
            return Err(TransferError::Exists(shown));
        }

        let dir = request.path.parent().unwrap_or(Path::new(""));
        let root = ctx.roots.root_for_write(dir)?;
        if let Err(e) = root.touch() {
            tracing::warn!(root = %root.path().display(), error = %e, "Failed to touch root");
        }

        let target = root.file(&request.path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(TransferError::Exists(shown));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(transfer = %self.index, path = %shown, root = %root.path().display(), "Receiving file");
        let result = self.receive_into(file, connection, request, ctx).await;

        match &result {
            Ok(()) => {
                ctx.outbox.push(SlaveMessage::DiskStatus {
                    status: ctx.roots.disk_status(),
                });
            }
            Err(_) => {
                if let Err(e) = tokio::fs::remove_file(&target).await {
                    tracing::warn!(path = %target.display(), error = %e, "Failed to remove partial upload");
                }
            }
        }
        result
    }

    async fn receive_into(
        &self,
        file: File,
        connection: Connection,
        request: &TransferRequest,
        ctx: &TransferContext,
    ) -> Result<(), TransferError> {
        let established = self.establish(connection, request.peer).await?;
        let mut stream = established.stream;
        let mut writer = BufWriter::with_capacity(ctx.policy.buffer_size, file);

        let plan = PumpPlan {
            ctx,
            checksum: ctx.policy.upload_checksums,
            ascii: false,
            min_speed: request.min_speed,
            max_speed: request.max_speed,
            follow: None,
        };
        self.pump(&mut stream, &mut writer, plan).await?;

        writer.into_inner().sync_data().await?;
        Ok(())
    }

    async fn run_send(
        &self,
        connection: Connection,
        request: &TransferRequest,
        ctx: &TransferContext,
    ) -> Result<(), TransferError> {
        self.check_aborted()?;

        let source = ctx.roots.find_file(&request.path)?;
        let mut file = File::open(&source).await?;
        if request.offset > 0 {
            file.seek(SeekFrom::Start(request.offset)).await?;
        }
        let follow = ctx.registry.upload_for(&request.path, self.index);
        if follow.is_some() {
            tracing::debug!(transfer = %self.index, path = %request.path.display(), "Following active upload");
        }

        let established = self.establish(connection, request.peer).await?;
        tracing::info!(transfer = %self.index, path = %request.path.display(), peer = %established.peer, "Sending file");
        let mut stream = established.stream;

        let plan = PumpPlan {
            ctx,
            checksum: ctx.policy.download_checksums,
            ascii: request.transfer_type == TransferType::Ascii,
            min_speed: request.min_speed,
            max_speed: request.max_speed,
            follow,
        };
        self.pump(&mut file, &mut stream, plan).await?;

        stream.shutdown().await?;
        Ok(())
    }

    /// Copy `reader` into `writer` until EOF, enforcing the policy
    async fn pump<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        plan: PumpPlan<'_>,
    ) -> Result<(), TransferError>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let policy = &plan.ctx.policy;
        let mut buf = vec![0u8; policy.buffer_size];
        let mut encoded = Vec::new();
        let mut encoder = plan.ascii.then(AsciiEncoder::new);
        let mut hasher = plan.checksum.then(crc32fast::Hasher::new);
        let mut throttle = Throttle::for_max_speed(plan.max_speed);
        let chunk = throttle
            .as_ref()
            .map_or(buf.len(), |t| t.chunk_size(buf.len()));
        let mut follow = plan.follow;

        let start = tokio::time::Instant::now();
        let mut status_tick = interval_at(start + policy.status_interval, policy.status_interval);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut speed_check =
            interval_at(start + policy.min_speed_grace, policy.min_speed_interval);
        speed_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.abort_error()),
                _ = status_tick.tick() => {
                    self.report(plan.ctx);
                    continue;
                }
                _ = speed_check.tick(), if plan.min_speed > 0 => {
                    self.check_speed(plan.min_speed)?;
                    continue;
                }
                result = reader.read(&mut buf[..chunk]) => result?,
            };

            if read == 0 {
                match &follow {
                    Some(upload) if upload.is_finished() => {
                        // one more pass picks up the upload's final bytes
                        follow = None;
                        continue;
                    }
                    Some(_) => {
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => return Err(self.abort_error()),
                            _ = tokio::time::sleep(policy.upload_poll) => {}
                        }
                        continue;
                    }
                    None => break,
                }
            }

            let data = &buf[..read];
            let out: &[u8] = match encoder.as_mut() {
                Some(encoder) => {
                    encoded.clear();
                    encoder.encode(data, &mut encoded);
                    &encoded
                }
                None => data,
            };
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(out);
                self.checksum
                    .store(hasher.clone().finalize(), Ordering::Relaxed);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.abort_error()),
                result = writer.write_all(out) => result?,
            }
            self.transferred.fetch_add(out.len() as u64, Ordering::Relaxed);

            if let Some(throttle) = throttle.as_mut() {
                let pause = throttle.register(out.len());
                if !pause.is_zero() {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(self.abort_error()),
                        _ = tokio::time::sleep(pause) => {}
                    }
                }
            }
        }

        writer.flush().await?;
        Ok(())
    }

    fn report(&self, ctx: &TransferContext) {
        ctx.outbox.send(
            ctx.command_index,
            SlaveMessage::TransferStatus {
                status: self.status(),
            },
        );
    }

    fn check_speed(&self, min: u64) -> Result<(), TransferError> {
        let speed = self.status().speed();
        if speed < min {
            return Err(TransferError::Slow { speed, min });
        }
        Ok(())
    }
}
