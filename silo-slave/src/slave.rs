//! Control connection to the master
//!
//! One slave process serves exactly one control connection. The read loop
//! spawns a task per command (bounded by `max_workers`) and a single writer
//! task owns the socket's write half, draining the outbox. Losing the
//! connection, a `shutdown` command, or a signal all end in the same place:
//! every active transfer is aborted and the process exits.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use silo_common::PROTOCOL_VERSION;
use silo_common::framing::{CommandIndex, FrameError, FrameReader, FrameWriter};
use silo_common::io::{Received, read_master_message_with_timeout, send_slave_message};
use silo_common::protocol::{MasterMessage, SlaveMessage};
use silo_common::version::is_compatible_str;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigError};
use crate::connection::{BoxedStream, ChannelSettings};
use crate::constants::{
    ABORT_REASON_SHUTDOWN, ERR_CONTROL_CLOSED, ERR_CONTROL_INACTIVE, ERR_HANDSHAKE_TIMEOUT,
    ERR_HANDSHAKE_REJECTED, ERR_HANDSHAKE_UNEXPECTED, ERR_TLS_UNAVAILABLE, ERR_WORKERS_CLOSED,
    FRAME_TIMEOUT, MSG_CONNECTED, MSG_CONNECTING, SHUTDOWN_GRACE,
};
use crate::handlers::{HandlerContext, dispatch};
use crate::outbox::{Outbox, Outgoing};
use crate::port_range::PortRange;
use crate::remerge::RemergeControl;
use crate::roots::{RootCollection, RootError, RootOptions, SelectionRegistry};
use crate::tls::{TlsContext, TlsError, server_name};
use crate::transfers::{TransferPolicy, TransferRegistry};

/// Fatal slave failures
#[derive(Debug, Error)]
pub enum SlaveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Roots(#[from] RootError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("cannot reach master at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("{prefix}{0}", prefix = ERR_HANDSHAKE_REJECTED)]
    HandshakeRejected(String),

    #[error("{0}")]
    Protocol(&'static str),

    #[error("{0}")]
    ControlLost(&'static str),

    #[error("control connection failed: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SlaveError {
    /// Whether this is a TLS peer hanging up without close_notify
    pub fn is_benign_disconnect(&self) -> bool {
        let text = self.to_string();
        text.contains("close_notify") || text.contains("unexpected end of file")
    }
}

/// State shared by every connection this slave serves
#[derive(Debug)]
pub struct Slave {
    config: Config,
    roots: Arc<RootCollection>,
    registry: Arc<TransferRegistry>,
    remerge: Arc<RemergeControl>,
    tls: Option<Arc<TlsContext>>,
    shutdown: CancellationToken,
}

impl Slave {
    /// Open roots and TLS material; fails on any startup misconfiguration
    pub fn new(config: Config, shutdown: CancellationToken) -> Result<Self, SlaveError> {
        config.validate()?;

        let selection = SelectionRegistry::with_builtin().create(&config.slave.disk_selection)?;
        let options = RootOptions {
            allow_shared_mounts: config.slave.allow_shared_mounts,
            concurrent_listing: config.slave.concurrent_root_iteration,
            listing_workers: 0,
        };
        let roots = RootCollection::from_paths(&config.slave.roots, selection, options)?;
        tracing::info!(
            roots = roots.len(),
            selection = roots.selection_name(),
            "Storage ready"
        );

        let tls = match config.cert_dir()? {
            Some(dir) => Some(Arc::new(TlsContext::load(
                &dir,
                &config.tls,
                config.master.fingerprint.as_deref(),
            )?)),
            None => None,
        };

        Ok(Self {
            config,
            roots: Arc::new(roots),
            registry: Arc::new(TransferRegistry::new()),
            remerge: Arc::new(RemergeControl::new()),
            tls,
            shutdown,
        })
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    /// Connect to the configured master and serve until shutdown
    pub async fn run(&self) -> Result<(), SlaveError> {
        let address = format!("{}:{}", self.config.master.host, self.config.master.port);
        tracing::info!("{}{}", MSG_CONNECTING, address);

        let connect_timeout = self.config.transfers.connect_timeout();
        let connect_error = |source| SlaveError::Connect {
            address: address.clone(),
            source,
        };
        let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| connect_error(io::ErrorKind::TimedOut.into()))?
            .map_err(connect_error)?;
        tcp.set_nodelay(true)?;
        let local = tcp.local_addr()?;

        let stream: BoxedStream = if self.config.master.tls {
            let Some(tls) = &self.tls else {
                return Err(SlaveError::Protocol(ERR_TLS_UNAVAILABLE));
            };
            let handshake = tls.connector().connect(server_name(), tcp);
            let secured = tokio::time::timeout(connect_timeout, handshake)
                .await
                .map_err(|_| connect_error(io::ErrorKind::TimedOut.into()))?
                .map_err(connect_error)?;
            Box::new(secured)
        } else {
            Box::new(tcp)
        };

        self.serve(stream, local).await
    }

    /// Speak the control protocol over an already connected stream
    pub async fn serve<S>(&self, stream: S, local: SocketAddr) -> Result<(), SlaveError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let mut frame_reader = FrameReader::new(BufReader::new(reader));
        let mut frame_writer = FrameWriter::new(writer);

        self.handshake(&mut frame_reader, &mut frame_writer).await?;
        tracing::info!("{}", MSG_CONNECTED);

        let (outbox, rx) = Outbox::channel();
        let ctx = self.context(outbox, local.ip());
        ctx.push_disk_status();

        let writer_done = CancellationToken::new();
        let writer = spawn_writer(frame_writer, rx, writer_done.clone(), self.shutdown.clone());

        let result = self.read_loop(&mut frame_reader, &ctx).await;
        self.shutdown.cancel();
        drop(ctx);
        writer_done.cancel();
        let written = writer.await.map_err(io::Error::other)?;

        result.and(written.map_err(SlaveError::from))
    }

    async fn handshake<R, W>(
        &self,
        reader: &mut FrameReader<R>,
        writer: &mut FrameWriter<W>,
    ) -> Result<(), SlaveError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let hello = SlaveMessage::Handshake {
            name: self.config.slave.name.clone(),
            version: PROTOCOL_VERSION.to_string(),
        };
        send_slave_message(writer, CommandIndex::UNSOLICITED, &hello).await?;

        match read_master_message_with_timeout(reader, self.config.read_timeout(), FRAME_TIMEOUT)
            .await
        {
            Ok(Some(Received {
                message:
                    MasterMessage::HandshakeResponse {
                        success: true,
                        version,
                        ..
                    },
                ..
            })) => {
                if let Some(version) = version
                    && !is_compatible_str(&version)
                {
                    tracing::warn!(%version, ours = PROTOCOL_VERSION, "Master version differs");
                }
                Ok(())
            }
            Ok(Some(Received {
                message: MasterMessage::HandshakeResponse { error, .. },
                ..
            })) => Err(SlaveError::HandshakeRejected(error.unwrap_or_default())),
            Ok(Some(_)) => Err(SlaveError::Protocol(ERR_HANDSHAKE_UNEXPECTED)),
            Ok(None) => Err(SlaveError::ControlLost(ERR_CONTROL_CLOSED)),
            Err(FrameError::IdleTimeout) => Err(SlaveError::Protocol(ERR_HANDSHAKE_TIMEOUT)),
            Err(e) => Err(e.into()),
        }
    }

    /// Read commands until the master goes away or shutdown is requested
    async fn read_loop<R>(
        &self,
        reader: &mut FrameReader<R>,
        ctx: &HandlerContext,
    ) -> Result<(), SlaveError>
    where
        R: AsyncRead + Unpin,
    {
        let permits = Arc::new(Semaphore::new(self.config.slave.max_workers));
        let mut workers = JoinSet::new();
        let inactivity = self.config.inactivity_timeout();
        let mut last_traffic = Instant::now();

        let result = loop {
            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Command task failed");
                }
            }

            let read = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break Ok(()),
                read = read_master_message_with_timeout(
                    reader,
                    self.config.read_timeout(),
                    FRAME_TIMEOUT,
                ) => read,
            };

            let (index, name, args) = match read {
                Ok(Some(Received {
                    index,
                    message: MasterMessage::Command { name, args },
                })) => (index, name, args),
                Ok(Some(Received { message, .. })) => {
                    last_traffic = Instant::now();
                    tracing::warn!(?message, "Ignoring unexpected message from master");
                    continue;
                }
                Ok(None) => break Err(SlaveError::ControlLost(ERR_CONTROL_CLOSED)),
                Err(FrameError::IdleTimeout) => {
                    if last_traffic.elapsed() >= inactivity {
                        break Err(SlaveError::ControlLost(ERR_CONTROL_INACTIVE));
                    }
                    continue;
                }
                Err(e) => break Err(e.into()),
            };
            last_traffic = Instant::now();

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break Ok(()),
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Err(SlaveError::Protocol(ERR_WORKERS_CLOSED)),
                },
            };
            let ctx = ctx.clone();
            workers.spawn(async move {
                let _permit = permit;
                dispatch(&ctx, index, &name, &args).await;
            });
        };

        // running commands still get to queue their final responses
        let aborted = self.registry.abort_all(ABORT_REASON_SHUTDOWN);
        if aborted > 0 {
            tracing::info!(transfers = aborted, "Aborted active transfers");
        }
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = workers.len(), "Cancelling unfinished commands");
            workers.abort_all();
        }

        result
    }

    fn context(&self, outbox: Outbox, local_ip: IpAddr) -> HandlerContext {
        let config = &self.config;
        let advertised_ip = match config.slave.bind_ip {
            Some(ip) if !ip.is_unspecified() => ip,
            _ => local_ip,
        };

        HandlerContext {
            roots: Arc::clone(&self.roots),
            registry: Arc::clone(&self.registry),
            remerge: Arc::clone(&self.remerge),
            channels: ChannelSettings {
                tls: self.tls.clone(),
                port_range: PortRange::from_window(config.ports.range(), config.slave.buffer_size),
                bind_ip: config.slave.bind_ip,
                buffer_size: config.slave.buffer_size,
                accept_timeout: config.transfers.accept_timeout(),
                connect_timeout: config.transfers.connect_timeout(),
            },
            policy: TransferPolicy::from_config(config),
            outbox,
            max_path_length: config.slave.max_path_length,
            ignore_partial: config.remerge.ignore_partial,
            advertised_ip,
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Drain the outbox onto the socket until `done`, then flush what is queued
fn spawn_writer<W>(
    mut writer: FrameWriter<W>,
    mut rx: UnboundedReceiver<Outgoing>,
    done: CancellationToken,
    shutdown: CancellationToken,
) -> JoinHandle<Result<(), FrameError>>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let outgoing = tokio::select! {
                biased;
                outgoing = rx.recv() => outgoing,
                _ = done.cancelled() => break,
            };
            let Some(Outgoing { index, message }) = outgoing else {
                break;
            };
            if let Err(e) = send_slave_message(&mut writer, index, &message).await {
                shutdown.cancel();
                return Err(e);
            }
        }

        while let Ok(Outgoing { index, message }) = rx.try_recv() {
            send_slave_message(&mut writer, index, &message).await?;
        }
        let _ = writer.shutdown().await;
        Ok(())
    })
}
