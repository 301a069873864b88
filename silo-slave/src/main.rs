//! Silo storage slave daemon

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use silo_slave::args::Args;
use silo_slave::config::Config;
use silo_slave::constants::MSG_SHUTDOWN_SIGNAL;
use silo_slave::slave::{Slave, SlaveError};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.debug);

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let slave = match Slave::new(config, shutdown.clone()) {
        Ok(slave) => slave,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("{}", MSG_SHUTDOWN_SIGNAL);
        signal_token.cancel();
    });

    match slave.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_slave_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `--debug` picks the level
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn log_slave_error(error: &SlaveError) {
    // Masters that drop TLS without close_notify are routine
    if error.is_benign_disconnect() {
        tracing::debug!(error = %error, "Master disconnected");
        return;
    }
    tracing::error!(error = %error, "Slave stopped");
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            tracing::warn!("Signal handlers unavailable, only the master can stop this slave");
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
