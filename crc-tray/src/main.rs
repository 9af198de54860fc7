//! crc-tray: background controller for the OpenShift Local daemon.
//!
//! Supervises the local virtualization daemon, polls its status, projects it
//! into menu affordances, owns every auxiliary surface, mediates lifecycle
//! actions, and runs the gated first-run provisioning flow. Renderer shells
//! attach over a Unix control socket; a second launch of the tray signals
//! the running instance through the same socket.

mod app;
mod desktop;
mod dispatcher;
mod logtail;
mod menu;
mod poller;
mod prompt;
mod proto;
mod setup;
mod shell;
mod singleton;
mod windows;

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::UnixListener;
use tokio::signal;
use tracing::{info, warn};

use crc_commander::{DaemonApi, DaemonCommander};

use crate::app::{App, AppConfig};
use crate::prompt::InteractivePrompt;
use crate::singleton::{InstanceLock, LockError};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "crc-tray", version)]
#[command(about = "Tray controller for the OpenShift Local daemon")]
struct Cli {
    /// Daemon API socket path
    #[arg(long)]
    daemon_socket: Option<PathBuf>,

    /// Shell control socket path
    #[arg(long)]
    control_socket: Option<PathBuf>,

    /// crc binary used for provisioning and developer terminals
    #[arg(long)]
    crc_binary: Option<PathBuf>,

    /// Instance lock file path
    #[arg(long)]
    lock_file: Option<PathBuf>,

    /// Status poll interval in seconds
    #[arg(long, default_value_t = 1)]
    poll_interval: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn crc_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".crc")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let daemon_socket = cli
        .daemon_socket
        .or_else(|| env::var("CRC_DAEMON_SOCKET").ok().map(PathBuf::from))
        .unwrap_or_else(crc_commander::default_socket_path);
    let control_socket = cli
        .control_socket
        .or_else(|| env::var("CRC_TRAY_SOCKET").ok().map(PathBuf::from))
        .unwrap_or_else(|| crc_home().join("crc-tray.sock"));
    let crc_binary = cli
        .crc_binary
        .or_else(|| env::var("CRC_BINARY").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("crc"));
    let lock_file = cli.lock_file.unwrap_or_else(|| crc_home().join("crc-tray.lock"));

    info!("crc-tray version {}", APP_VERSION);

    let lock = match InstanceLock::acquire(&lock_file) {
        Ok(lock) => lock,
        Err(LockError::AlreadyRunning(path)) => {
            info!(lock = %path.display(), "another instance is running; redirecting");
            if let Err(err) = shell::signal_running_instance(&control_socket).await {
                warn!(error = %err, "could not reach the running instance");
            }
            return Ok(());
        }
        Err(LockError::Io(err)) => {
            return Err(err).context("failed to acquire the instance lock");
        }
    };

    // The lock guarantees no live instance owns the socket; anything left on
    // disk is stale.
    if let Some(parent) = control_socket.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&control_socket);
    let listener = UnixListener::bind(&control_socket)
        .with_context(|| format!("failed to bind control socket {}", control_socket.display()))?;
    info!("shell control socket listening on {}", control_socket.display());

    let client: Arc<dyn DaemonApi> = Arc::new(DaemonCommander::new(&daemon_socket));
    let (bus_tx, bus_rx) = tokio::sync::mpsc::unbounded_channel();
    let app = App::new(
        client,
        AppConfig {
            crc_binary,
            poll_interval: Duration::from_secs(cli.poll_interval.max(1)),
            tail_interval: logtail::TAIL_INTERVAL,
        },
        bus_tx,
        Arc::new(InteractivePrompt),
    );

    shell::spawn_broadcaster(app.clone(), bus_rx);
    tokio::spawn(shell::run_server(app.clone(), listener));

    {
        let shutdown = app.shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    if app.setup.needs_onboarding().await {
        info!("system not provisioned yet; entering onboarding");
        desktop::enable_autostart();
        app.enter_onboarding().await;
    } else {
        app.begin_normal_operation().await;
    }

    app.shutdown.cancelled().await;

    // Shutdown sequence: every window handle first, then the lock, then
    // exit. Destruction handlers must never fire after the lock is gone.
    {
        let mut windows = app.windows.lock().await;
        windows.begin_shutdown();
        windows.destroy_all();
    }
    app.poll_cancel.cancel();
    if let Some(tail) = app.tail.lock().await.take() {
        tail.stop();
    }
    lock.release();
    let _ = std::fs::remove_file(&control_socket);
    info!("shutdown complete");
    Ok(())
}
